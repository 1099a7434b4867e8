//! aqlog sampling daemon (aqlogd)
//!
//! Runs the acquisition supervisor in the foreground until SIGINT/SIGTERM,
//! logging the latest composed sample at a fixed interval.
//!
//! # Lifecycle
//! - **Config**: `AQLOG_CONFIG` JSON file, then environment overrides
//! - **Logging**: systemd journal when available, stdout otherwise
//! - **Shutdown**: stops the worker, which saves calibration and releases the bus
//! - **Dump**: optionally writes the buffered samples as JSON on exit

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use aq_core::constants::paths;
use aq_core::{AcquisitionConfig, AcquisitionSupervisor, Sample, StartOptions};
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often the latest sample is logged
const REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Granularity of the shutdown check in the main loop
const TICK: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    dump: Option<PathBuf>,
    command_sensor: Option<bool>,
    register_sensor: Option<bool>,
    aux_inputs: bool,
}

enum Parsed {
    Run(Args),
    Exit,
}

fn print_help() {
    eprintln!("aqlogd {} - air-quality sampling daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    aqlogd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH       JSON configuration file");
    eprintln!("    -d, --dump PATH         Write buffered samples as JSON on exit");
    eprintln!("        --command-sensor    Enable the command-word CO2 sensor");
    eprintln!("        --no-register       Disable the register-mapped sensor");
    eprintln!("        --aux               Enable auxiliary inputs");
    eprintln!("    -v, --version           Print version");
    eprintln!("    -h, --help              Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {:<24}Log level (trace, debug, info, warn, error)", paths::env::LOG);
    eprintln!("    {:<24}Configuration file", paths::env::CONFIG);
    eprintln!("    {:<24}Bus number or device path", paths::env::I2C_BUS);
    eprintln!("    {:<24}Register sensor address", paths::env::REGISTER_ADDR);
    eprintln!("    {:<24}Command sensor address", paths::env::COMMAND_ADDR);
    eprintln!("    {:<24}Calibration file", paths::env::CALIBRATION_FILE);
    eprintln!("    {:<24}Reset GPIO line", paths::env::RESET_GPIO);
    eprintln!("    {:<24}Never fall back to the simulator", paths::env::FORCE_HARDWARE);
}

fn parse_args(args: &[String]) -> anyhow::Result<Parsed> {
    let mut parsed = Args::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(Parsed::Exit);
            }
            "-v" | "--version" => {
                println!("aqlogd {}", VERSION);
                return Ok(Parsed::Exit);
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).context("--config requires a path argument")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "-d" | "--dump" => {
                i += 1;
                let path = args.get(i).context("--dump requires a path argument")?;
                parsed.dump = Some(PathBuf::from(path));
            }
            "--command-sensor" => parsed.command_sensor = Some(true),
            "--no-register" => parsed.register_sensor = Some(false),
            "--aux" => parsed.aux_inputs = true,
            arg => {
                print_help();
                anyhow::bail!("Unknown argument: {}", arg);
            }
        }
        i += 1;
    }
    Ok(Parsed::Run(parsed))
}

fn init_logging() -> bool {
    let log_level = std::env::var(paths::env::LOG).unwrap_or_else(|_| "info".to_string());

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
    false
}

fn load_config(args: &Args) -> anyhow::Result<AcquisitionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = AcquisitionConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
            config.validate()?;
            config
        }
        None => AcquisitionConfig::from_env()?,
    };

    if let Some(enabled) = args.command_sensor {
        config.options.use_command_sensor = enabled;
    }
    if let Some(enabled) = args.register_sensor {
        config.options.use_register_sensor = enabled;
    }
    config.options.use_aux_inputs |= args.aux_inputs;
    Ok(config)
}

fn report(sample: &Sample) {
    info!(
        "co2={} ppm voc={} temp={:.1} C rh={}",
        sample.co2,
        sample.voc.map_or_else(|| "-".to_string(), |v| format!("{} ppb", v)),
        sample.temperature,
        sample.humidity.map_or_else(|| "-".to_string(), |h| format!("{:.1}%", h)),
    );
}

fn dump_samples(path: &Path, samples: &[Sample]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(samples)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let options: StartOptions = config.options;
    info!(
        "STARTUP: register={:?}@0x{:02X} command={:?}@0x{:02X} calibration={}",
        config.register_sensor.bus,
        config.register_sensor.address,
        config.command_sensor.bus,
        config.command_sensor.address,
        config.calibration_file.display()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let supervisor = AcquisitionSupervisor::new(config.clone());
    supervisor
        .start(config.poll_interval(), options)
        .context("starting acquisition")?;

    let buffer = supervisor.buffer();
    let mut last_report = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(TICK);
        if last_report.elapsed() >= REPORT_INTERVAL {
            match buffer.latest() {
                Some(sample) => report(&sample),
                None => warn!("No samples yet"),
            }
            let status = supervisor.status();
            if status.degraded() {
                warn!("Running degraded: {:?}", status.slots);
            }
            last_report = Instant::now();
        }
    }

    supervisor.stop();

    if let Some(path) = &args.dump {
        dump_samples(path, &buffer.snapshot())?;
    }
    info!("SHUTDOWN: aqlogd stopped");
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let parsed = match parse_args(&args) {
        Ok(Parsed::Run(parsed)) => parsed,
        Ok(Parsed::Exit) => return,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let journald = init_logging();
    info!("STARTUP: aqlogd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if journald { "systemd journal" } else { "stdout" });

    if let Err(e) = run(parsed) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
