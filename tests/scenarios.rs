use simple_pid as sp;
use sp::{Clock, RowWriter};

fn heater_config() -> sp::ControllerConfig {
    sp::ControllerConfig {
        set_point: 45.0,
        min_output: 0.0,
        max_output: 1.0,
        kp: 0.1,
        ki: 0.03,
        kd: 0.0,
        sample_period_ms: 100,
        direction_is_direct: true,
    }
}

/// Closed loop on a simulated clock; returns the output of every sample.
fn run(
    cfg: sp::ControllerConfig,
    actuator: sp::Actuator,
    seconds: u64,
    sensor: &mut sp::Sensor,
) -> (sp::ThermalPlant, Vec<f64>) {
    let clock = sp::ManualClock::new(0);
    let mut pid = sp::Controller::with_clock(cfg, clock.clone()).unwrap();
    let mut plant = sp::ThermalPlant::new(sp::ThermalParams::default(), actuator);
    let mut outputs = Vec::new();
    let mut drive = 0.0;

    for _ in 0..seconds * 100 {
        clock.advance(10);
        plant.step(drive, 0.01);
        if pid.time_to_sample() {
            drive = match pid.compute_output(sensor.read(plant.temp_c)) {
                Ok(u) => u,
                Err(fault) => fault.held_output,
            };
            outputs.push(drive);
        }
    }

    (plant, outputs)
}

#[test]
fn heater_tracks_set_point() {
    let mut sensor = sp::Sensor::new(3);
    let (plant, outputs) = run(heater_config(), sp::Actuator::Heating, 300, &mut sensor);

    assert!((plant.temp_c - 45.0).abs() < 0.5, "temp {}", plant.temp_c);
    assert!(outputs.iter().all(|u| (0.0..=1.0).contains(u)));
    // Steady drive is what holds the plant at 45 °C.
    let expected = (45.0 - 25.0) * plant.params.loss_coeff / plant.params.actuator_gain;
    assert!((outputs.last().unwrap() - expected).abs() < 0.01);
}

#[test]
fn reverse_acting_controller_drives_a_chiller() {
    let cfg = sp::ControllerConfig {
        set_point: 12.0,
        direction_is_direct: false,
        ..heater_config()
    };
    let mut sensor = sp::Sensor::new(3);
    let (plant, _) = run(cfg, sp::Actuator::Cooling, 300, &mut sensor);
    assert!((plant.temp_c - 12.0).abs() < 0.5, "temp {}", plant.temp_c);
}

#[test]
fn output_stays_in_bounds_with_noisy_feedback() {
    let mut sensor = sp::Sensor::new(99);
    sensor.noise_std = 2.0;
    let cfg = sp::ControllerConfig {
        kp: 3.0,
        ki: 1.0,
        kd: 0.5,
        ..heater_config()
    };
    let (_, outputs) = run(cfg, sp::Actuator::Heating, 60, &mut sensor);
    assert!(!outputs.is_empty());
    assert!(outputs.iter().all(|u| (0.0..=1.0).contains(u)));
}

#[test]
fn reverse_mode_mirrors_direct_mode() {
    let cfg = sp::ControllerConfig {
        set_point: 3.0,
        min_output: -50.0,
        max_output: 50.0,
        kp: 1.3,
        ki: 0.7,
        kd: 0.05,
        sample_period_ms: 50,
        direction_is_direct: true,
    };
    let clock = sp::ManualClock::new(0);
    let mut direct = sp::Controller::with_clock(cfg, clock.clone()).unwrap();
    let mut reverse = sp::Controller::with_clock(
        sp::ControllerConfig {
            direction_is_direct: false,
            ..cfg
        },
        clock,
    )
    .unwrap();

    for feedback in [0.0, 1.0, 2.5, 10.0, -4.0, 3.0, 3.0, 80.0, -80.0] {
        let u = direct.compute_output(feedback).unwrap();
        let v = reverse.compute_output(feedback).unwrap();
        assert!((u + v).abs() < 1e-9, "{u} vs {v}");
    }
}

#[test]
fn dropped_readings_hold_the_actuator() {
    let mut sensor = sp::Sensor::new(5);
    sensor.fault = sp::SensorFault::DropoutEvery { n: 5 };
    let (plant, outputs) = run(heater_config(), sp::Actuator::Heating, 300, &mut sensor);

    assert!(outputs.iter().all(|u| u.is_finite()));
    assert!((plant.temp_c - 45.0).abs() < 0.5, "temp {}", plant.temp_c);
}

#[test]
fn retuning_mid_run_takes_effect_on_next_sample() {
    let clock = sp::ManualClock::new(0);
    let mut pid = sp::Controller::with_clock(
        sp::ControllerConfig {
            set_point: 10.0,
            min_output: -100.0,
            max_output: 100.0,
            kp: 2.0,
            ki: 0.0,
            ..heater_config()
        },
        clock.clone(),
    )
    .unwrap();

    assert_eq!(pid.compute_output(0.0).unwrap(), 20.0);
    pid.set_kp(3.0).unwrap();
    // 20 + 3*10 - 3*10
    assert_eq!(pid.compute_output(0.0).unwrap(), 20.0);
    // 20 + 3*5 - 3*10
    assert_eq!(pid.compute_output(5.0).unwrap(), 5.0);

    clock.advance(101);
    assert!(pid.time_to_sample());
    assert_eq!(clock.now_ms(), 101);
}

#[test]
fn loop_forwards_samples_to_a_writer() {
    let clock = sp::ManualClock::new(0);
    let mut pid = sp::Controller::with_clock(heater_config(), clock.clone()).unwrap();
    let mut writer = sp::CsvWriter::new(Vec::new());

    for _ in 0..50 {
        clock.advance(25);
        if pid.time_to_sample() {
            let feedback = 40.0;
            let output = pid.compute_output(feedback).unwrap();
            writer
                .write_row(&sp::SampleRow {
                    t_ms: clock.now_ms(),
                    set_point: pid.set_point(),
                    feedback,
                    output,
                    fault: false,
                })
                .unwrap();
        }
    }
    writer.flush().unwrap();

    let text = String::from_utf8(writer.into_inner()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("t_ms,set_point,feedback,output,fault"));
    // 25 ms ticks against a 100 ms period: a sample every 125 ms.
    assert_eq!(lines.next().map(|l| l.split(',').next()), Some(Some("125")));
    assert_eq!(text.lines().count(), 1 + 10);
}
