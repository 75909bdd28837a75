//! Discrete-time PID controller in velocity (incremental) form.
//!
//! Each output is the previous clamped output plus a weighted sum of the
//! last three error samples, so there is no free-running integral to wind up.

mod clock;
mod error;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{ControllerError, NumericFault};

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ControllerConfig {
    pub set_point: f64,
    pub min_output: f64,
    pub max_output: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub sample_period_ms: u32,
    /// `false` selects reverse acting: all gains change sign.
    pub direction_is_direct: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            set_point: 0.0,
            min_output: 0.0,
            max_output: 1.0,
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            sample_period_ms: 100,
            direction_is_direct: true,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        check_finite("set_point", self.set_point)?;
        check_limits(self.min_output, self.max_output)?;
        check_finite("kp", self.kp)?;
        check_finite("ki", self.ki)?;
        check_finite("kd", self.kd)?;
        check_period(self.sample_period_ms)
    }

    /// Gains with the polarity applied.
    fn effective_gains(&self) -> (f64, f64, f64) {
        if self.direction_is_direct {
            (self.kp, self.ki, self.kd)
        } else {
            (-self.kp, -self.ki, -self.kd)
        }
    }
}

fn check_finite(name: &'static str, v: f64) -> Result<(), ControllerError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ControllerError::invalid(name, "must be finite"))
    }
}

fn check_limits(min_output: f64, max_output: f64) -> Result<(), ControllerError> {
    check_finite("min_output", min_output)?;
    check_finite("max_output", max_output)?;
    if min_output > max_output {
        return Err(ControllerError::invalid(
            "min_output",
            "must not exceed max_output",
        ));
    }
    Ok(())
}

fn check_period(sample_period_ms: u32) -> Result<(), ControllerError> {
    if sample_period_ms == 0 {
        return Err(ControllerError::invalid(
            "sample_period_ms",
            "must be positive",
        ));
    }
    Ok(())
}

/// Weights of the three-term recurrence
/// `u[k] = u[k-1] + a*e[k] + b*e[k-1] + c*e[k-2]`.
///
/// Trapezoidal integration for the I term, backward difference for the D term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Coefficients {
    pub fn derive(cfg: &ControllerConfig) -> Self {
        let (kp, ki, kd) = cfg.effective_gains();
        let t = f64::from(cfg.sample_period_ms) / 1000.0;

        Self {
            a: kp + ki * (t / 2.0) + kd / t,
            b: -kp + ki * (t / 2.0) - (2.0 * kd) / t,
            c: kd / t,
        }
    }
}

/// Single-loop PID controller.
///
/// Not synchronized: one owner drives both the setters and
/// [`compute_output`](Controller::compute_output).
#[derive(Clone, Debug)]
pub struct Controller<C: Clock = MonotonicClock> {
    cfg: ControllerConfig,
    coeffs: Coefficients,
    clock: C,
    last_sample_time: u64,
    error_prev1: f64,
    error_prev2: f64,
    output_prev1: f64,
}

impl Controller<MonotonicClock> {
    pub fn new(cfg: ControllerConfig) -> Result<Self, ControllerError> {
        Self::with_clock(cfg, MonotonicClock::new())
    }
}

impl<C: Clock> Controller<C> {
    pub fn with_clock(cfg: ControllerConfig, clock: C) -> Result<Self, ControllerError> {
        cfg.validate()?;

        let coeffs = Coefficients::derive(&cfg);
        debug!("initial coefficients {coeffs:?}");

        Ok(Self {
            cfg,
            coeffs,
            last_sample_time: clock.now_ms(),
            clock,
            error_prev1: 0.0,
            error_prev2: 0.0,
            output_prev1: 0.0,
        })
    }

    /// Advance the loop by one sample and return the clamped output.
    ///
    /// A non-finite result leaves every piece of rolling state untouched.
    pub fn compute_output(&mut self, feedback: f64) -> Result<f64, NumericFault> {
        let error = self.cfg.set_point - feedback;
        let Coefficients { a, b, c } = self.coeffs;

        let raw = self.output_prev1 + a * error + b * self.error_prev1 + c * self.error_prev2;
        if !raw.is_finite() {
            warn!(
                "non-finite output (feedback={feedback}, error={error}), holding {}",
                self.output_prev1
            );
            return Err(NumericFault {
                feedback,
                held_output: self.output_prev1,
            });
        }

        let mut output = raw;
        if output > self.cfg.max_output {
            output = self.cfg.max_output;
        } else if output < self.cfg.min_output {
            output = self.cfg.min_output;
        }

        self.error_prev2 = self.error_prev1;
        self.error_prev1 = error;
        self.output_prev1 = output;

        Ok(output)
    }

    /// Polling rate limiter driven by the injected clock.
    pub fn time_to_sample(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.time_to_sample_at(now)
    }

    /// Returns true, and restarts the period, once more than
    /// `sample_period_ms` has elapsed since the last accepted sample.
    pub fn time_to_sample_at(&mut self, now_ms: u64) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_sample_time);
        if elapsed > u64::from(self.cfg.sample_period_ms) {
            self.last_sample_time = now_ms;
            true
        } else {
            false
        }
    }

    /// Forget the error history and previous output. Tunables and the sample
    /// clock are kept.
    pub fn reset(&mut self) {
        self.error_prev1 = 0.0;
        self.error_prev2 = 0.0;
        self.output_prev1 = 0.0;
    }

    pub fn controller_direction(&self) -> bool {
        self.cfg.direction_is_direct
    }

    pub fn set_controller_direction(&mut self, direction_is_direct: bool) {
        self.cfg.direction_is_direct = direction_is_direct;
        self.update_coeffs();
    }

    pub fn sample_period_ms(&self) -> u32 {
        self.cfg.sample_period_ms
    }

    pub fn set_sample_period_ms(&mut self, sample_period_ms: u32) -> Result<(), ControllerError> {
        check_period(sample_period_ms)?;
        self.cfg.sample_period_ms = sample_period_ms;
        self.update_coeffs();
        Ok(())
    }

    pub fn kp(&self) -> f64 {
        self.cfg.kp
    }

    pub fn ki(&self) -> f64 {
        self.cfg.ki
    }

    pub fn kd(&self) -> f64 {
        self.cfg.kd
    }

    pub fn set_kp(&mut self, kp: f64) -> Result<(), ControllerError> {
        check_finite("kp", kp)?;
        self.cfg.kp = kp;
        self.update_coeffs();
        Ok(())
    }

    pub fn set_ki(&mut self, ki: f64) -> Result<(), ControllerError> {
        check_finite("ki", ki)?;
        self.cfg.ki = ki;
        self.update_coeffs();
        Ok(())
    }

    pub fn set_kd(&mut self, kd: f64) -> Result<(), ControllerError> {
        check_finite("kd", kd)?;
        self.cfg.kd = kd;
        self.update_coeffs();
        Ok(())
    }

    /// Replace all three gains with a single recompute.
    pub fn set_tunings(&mut self, kp: f64, ki: f64, kd: f64) -> Result<(), ControllerError> {
        check_finite("kp", kp)?;
        check_finite("ki", ki)?;
        check_finite("kd", kd)?;
        self.cfg.kp = kp;
        self.cfg.ki = ki;
        self.cfg.kd = kd;
        self.update_coeffs();
        Ok(())
    }

    pub fn set_point(&self) -> f64 {
        self.cfg.set_point
    }

    pub fn set_set_point(&mut self, set_point: f64) -> Result<(), ControllerError> {
        check_finite("set_point", set_point)?;
        self.cfg.set_point = set_point;
        Ok(())
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.cfg.min_output, self.cfg.max_output)
    }

    /// The stored previous output is pulled into the new range so the next
    /// recurrence starts from a reachable value.
    pub fn set_output_limits(
        &mut self,
        min_output: f64,
        max_output: f64,
    ) -> Result<(), ControllerError> {
        check_limits(min_output, max_output)?;
        self.cfg.min_output = min_output;
        self.cfg.max_output = max_output;
        self.output_prev1 = self.output_prev1.clamp(min_output, max_output);
        Ok(())
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coeffs
    }

    pub fn last_output(&self) -> f64 {
        self.output_prev1
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    fn update_coeffs(&mut self) {
        self.coeffs = Coefficients::derive(&self.cfg);
        debug!(
            "coefficients a={} b={} c={} (kp={} ki={} kd={} dt={}ms direct={})",
            self.coeffs.a,
            self.coeffs.b,
            self.coeffs.c,
            self.cfg.kp,
            self.cfg.ki,
            self.cfg.kd,
            self.cfg.sample_period_ms,
            self.cfg.direction_is_direct
        );
    }
}
