use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use controller::{Clock, Controller, ControllerConfig, ManualClock};
use fern::Dispatch;
use log::{info, warn};
use sim::{Actuator, Sensor, SensorFault, ThermalParams, ThermalPlant};
use telemetry::{CsvWriter, JsonLinesWriter, RowWriter, SampleRow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Plant {
    Heating,
    Cooling,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(
    name = "simple-pid",
    version,
    about = "Run the PID controller against a simulated thermal plant"
)]
struct Args {
    /// Controller config as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    set_point: Option<f64>,
    #[arg(long)]
    kp: Option<f64>,
    #[arg(long)]
    ki: Option<f64>,
    #[arg(long)]
    kd: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    min_output: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    max_output: Option<f64>,

    /// Controller sample period in milliseconds
    #[arg(long)]
    period_ms: Option<u32>,

    /// Reverse-acting controller (gains change sign)
    #[arg(long)]
    reverse: bool,

    #[arg(value_enum, long, default_value = "heating")]
    plant: Plant,

    /// Simulated run length in seconds
    #[arg(long, default_value_t = 120.0)]
    seconds: f64,

    /// Simulation tick (loop polling cadence) in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// RNG seed for sensor noise
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Sensor noise standard deviation (°C)
    #[arg(long, default_value_t = 0.1)]
    noise: f64,

    /// Lose every n-th sensor reading
    #[arg(long)]
    dropout_every: Option<u64>,

    #[arg(value_enum, long, default_value = "csv")]
    format: Format,

    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Trace destination; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Also append log lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn setup_logger(level: log::LevelFilter, file: Option<&PathBuf>) -> Result<()> {
    let mut dispatch = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr());

    if let Some(path) = file {
        dispatch = dispatch.chain(
            fern::log_file(path).with_context(|| format!("opening log file {}", path.display()))?,
        );
    }

    dispatch.apply()?;
    Ok(())
}

/// Starting point when no config file is given: tuned for the default plant.
fn demo_config(plant: Plant) -> ControllerConfig {
    match plant {
        Plant::Heating => ControllerConfig {
            set_point: 60.0,
            kp: 0.08,
            ki: 0.02,
            kd: 0.0,
            ..ControllerConfig::default()
        },
        Plant::Cooling => ControllerConfig {
            set_point: 10.0,
            kp: 0.08,
            ki: 0.02,
            kd: 0.0,
            direction_is_direct: false,
            ..ControllerConfig::default()
        },
    }
}

fn resolve_config(args: &Args) -> Result<ControllerConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => demo_config(args.plant),
    };

    if let Some(v) = args.set_point {
        cfg.set_point = v;
    }
    if let Some(v) = args.kp {
        cfg.kp = v;
    }
    if let Some(v) = args.ki {
        cfg.ki = v;
    }
    if let Some(v) = args.kd {
        cfg.kd = v;
    }
    if let Some(v) = args.min_output {
        cfg.min_output = v;
    }
    if let Some(v) = args.max_output {
        cfg.max_output = v;
    }
    if let Some(v) = args.period_ms {
        cfg.sample_period_ms = v;
    }
    if args.reverse {
        cfg.direction_is_direct = false;
    }

    cfg.validate().context("invalid controller configuration")?;
    Ok(cfg)
}

struct LoopSettings {
    seconds: f64,
    tick_ms: u64,
    plant: Plant,
    seed: u64,
    noise: f64,
    dropout_every: Option<u64>,
}

#[derive(Debug, Default)]
struct RunSummary {
    samples: u64,
    faults: u64,
    final_temp_c: f64,
}

fn run_loop(
    cfg: ControllerConfig,
    s: &LoopSettings,
    writer: &mut dyn RowWriter,
) -> Result<RunSummary> {
    anyhow::ensure!(s.tick_ms > 0, "tick must be at least 1 ms");

    let clock = ManualClock::new(0);
    let mut pid = Controller::with_clock(cfg, clock.clone())?;

    let actuator = match s.plant {
        Plant::Heating => Actuator::Heating,
        Plant::Cooling => Actuator::Cooling,
    };
    let mut plant = ThermalPlant::new(ThermalParams::default(), actuator);

    let mut sensor = Sensor::new(s.seed);
    sensor.noise_std = s.noise;
    if let Some(n) = s.dropout_every {
        sensor.fault = SensorFault::DropoutEvery { n };
    }

    let ticks = (s.seconds * 1000.0 / s.tick_ms as f64).ceil() as u64;
    let dt_s = s.tick_ms as f64 / 1000.0;
    let mut drive = pid.last_output();
    let mut summary = RunSummary::default();

    info!(
        "running {ticks} ticks of {}ms, sample period {}ms, plant {:?}",
        s.tick_ms, cfg.sample_period_ms, s.plant
    );

    for _ in 0..ticks {
        clock.advance(s.tick_ms);
        plant.step(drive, dt_s);

        if !pid.time_to_sample() {
            continue;
        }

        let feedback = sensor.read(plant.temp_c);
        let (output, fault) = match pid.compute_output(feedback) {
            Ok(u) => (u, false),
            Err(e) => {
                summary.faults += 1;
                (e.held_output, true)
            }
        };
        drive = output;
        summary.samples += 1;

        writer.write_row(&SampleRow {
            t_ms: clock.now_ms(),
            set_point: pid.set_point(),
            feedback,
            output,
            fault,
        })?;
    }
    writer.flush()?;

    summary.final_temp_c = plant.temp_c;
    if summary.faults > 0 {
        warn!("{} samples held on numeric faults", summary.faults);
    }
    info!(
        "done: {} samples, final temperature {:.2}°C (set point {})",
        summary.samples,
        summary.final_temp_c,
        pid.set_point()
    );

    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.log_level, args.log_file.as_ref())?;

    let cfg = resolve_config(&args)?;
    let settings = LoopSettings {
        seconds: args.seconds,
        tick_ms: args.tick_ms,
        plant: args.plant,
        seed: args.seed,
        noise: args.noise,
        dropout_every: args.dropout_every,
    };

    let sink: Box<dyn io::Write> = match &args.output {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("creating trace file {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let sink = BufWriter::new(sink);

    let mut writer: Box<dyn RowWriter> = match args.format {
        Format::Csv => Box::new(CsvWriter::with_delimiter(sink, args.delimiter)),
        Format::Jsonl => Box::new(JsonLinesWriter::new(sink)),
    };

    run_loop(cfg, &settings, &mut *writer)?;
    Ok(())
}
