use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Which way the actuator pushes the temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actuator {
    /// More drive, hotter. Pairs with a direct-acting controller.
    Heating,
    /// More drive, colder. Pairs with a reverse-acting controller.
    Cooling,
}

#[derive(Clone, Copy, Debug)]
pub struct ThermalParams {
    pub ambient_c: f64,
    pub thermal_mass: f64,
    /// Heat flow at full drive.
    pub actuator_gain: f64,
    /// Passive exchange with ambient per degree of difference.
    pub loss_coeff: f64,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            ambient_c: 25.0,
            thermal_mass: 50.0,
            actuator_gain: 150.0,
            loss_coeff: 1.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ThermalPlant {
    pub params: ThermalParams,
    pub actuator: Actuator,
    pub temp_c: f64,
    /// Last applied drive, 0..=1
    pub drive: f64,
}

impl ThermalPlant {
    pub fn new(params: ThermalParams, actuator: Actuator) -> Self {
        Self {
            temp_c: params.ambient_c,
            params,
            actuator,
            drive: 0.0,
        }
    }

    /// Euler step of
    /// dT/dt = (±actuator_gain*drive - loss_coeff*(T-ambient)) / thermal_mass
    pub fn step(&mut self, drive: f64, dt_s: f64) {
        self.drive = if drive.is_nan() { 0.0 } else { drive.clamp(0.0, 1.0) };

        let p = &self.params;
        let sign = match self.actuator {
            Actuator::Heating => 1.0,
            Actuator::Cooling => -1.0,
        };
        let heat_in = sign * p.actuator_gain * self.drive;
        let heat_out = p.loss_coeff * (self.temp_c - p.ambient_c);
        self.temp_c += (heat_in - heat_out) / p.thermal_mass * dt_s;

        if !self.temp_c.is_finite() {
            self.temp_c = p.ambient_c;
        }
    }

    /// Temperature the plant settles at under a constant drive.
    pub fn equilibrium(&self, drive: f64) -> f64 {
        let p = &self.params;
        let sign = match self.actuator {
            Actuator::Heating => 1.0,
            Actuator::Cooling => -1.0,
        };
        p.ambient_c + sign * p.actuator_gain * drive.clamp(0.0, 1.0) / p.loss_coeff
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorFault {
    None,
    Stuck { value: f64 },
    Bias { value: f64 },
    /// Every n-th reading is lost (NaN).
    DropoutEvery { n: u64 },
}

#[derive(Clone, Debug)]
pub struct Sensor {
    pub noise_std: f64,
    pub fault: SensorFault,
    rng: StdRng,
    reads: u64,
}

impl Sensor {
    pub fn new(seed: u64) -> Self {
        Self {
            noise_std: 0.0,
            fault: SensorFault::None,
            rng: StdRng::seed_from_u64(seed),
            reads: 0,
        }
    }

    pub fn read(&mut self, true_value: f64) -> f64 {
        self.reads += 1;

        let mut v = match self.fault {
            SensorFault::None => true_value,
            SensorFault::Stuck { value } => value,
            SensorFault::Bias { value } => true_value + value,
            SensorFault::DropoutEvery { n } => {
                if n > 0 && self.reads % n == 0 {
                    return f64::NAN;
                }
                true_value
            }
        };

        if self.noise_std > 0.0 {
            if let Ok(normal) = Normal::new(0.0, self.noise_std) {
                v += normal.sample(&mut self.rng);
            }
        }

        v
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}
