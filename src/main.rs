//! domewatch main entry point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimulatedDome      JsonFileWeather   FileOverrides            │
//! │  (HardwareSession)  (WeatherSource)   (OverrideSource)         │
//! │  FileStatus         LogAlertSink      SystemClock              │
//! │  (StatusPublisher)  (AlertSink)       (Clock)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │         DomeController (one thread per dome)           │    │
//! │  │  Evaluator · Manual gate · Phase machine               │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Supervisor (fault isolation · restart policy · alerts)        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `domewatch [config.json]`, or set `DOMEWATCH_CONFIG`.
//! Without a config file the built-in two-dome simulated site runs.
#![deny(unused_must_use)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use domewatch::adapters;
use domewatch::adapters::daily_log::DailyLogWriter;
use domewatch::adapters::log_sink::LogAlertSink;
use domewatch::adapters::overrides::FileOverrideSource;
use domewatch::adapters::status_file::FileStatusPublisher;
use domewatch::adapters::time::SystemClock;
use domewatch::adapters::weather_file::JsonFileWeatherSource;
use domewatch::app::ports::{AlertSink, Clock, DomePorts};
use domewatch::app::service::DomeController;
use domewatch::config::SiteConfig;
use domewatch::diagnostics;
use domewatch::supervisor::{DomeWorker, ShutdownSignal, Supervisor, WorkerExit};

const CONFIG_ENV: &str = "DOMEWATCH_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Load the config before logging exists; the caller logs where it came from.
fn load_config(path: Option<&Path>) -> Result<SiteConfig> {
    match path {
        Some(path) => {
            SiteConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            let config = SiteConfig::default();
            config.validate().context("built-in defaults")?;
            Ok(config)
        }
    }
}

/// `RUST_LOG` filtering as usual; with `log_dir` set, output goes to the
/// per-night files instead of stderr.
fn init_logging(config: &SiteConfig) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(dir) = &config.log_dir {
        let writer = DailyLogWriter::new(dir, Arc::new(SystemClock))
            .with_context(|| format!("opening log directory {}", dir.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(writer)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    // ── 1. Config and logging ─────────────────────────────────
    let path = config_path();
    let config = Arc::new(load_config(path.as_deref())?);
    init_logging(&config)?;
    diagnostics::install_panic_handler();

    info!("domewatch v{}", env!("CARGO_PKG_VERSION"));
    match &path {
        Some(path) => info!("Config loaded from {}", path.display()),
        None => warn!("No config given ({CONFIG_ENV} unset); using the built-in simulated site"),
    }

    // ── 2. Directories ────────────────────────────────────────
    for dir in [&config.status_dir, &config.override_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // ── 3. Shared adapters ────────────────────────────────────
    let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let weather = Arc::new(JsonFileWeatherSource::new(&config.weather_file));
    let overrides = Arc::new(FileOverrideSource::new(&config.override_dir));
    let status = Arc::new(FileStatusPublisher::new(&config.status_dir));

    // ── 4. One worker per dome ────────────────────────────────
    let workers: Vec<DomeWorker> = config
        .domes
        .iter()
        .map(|dome| {
            let dome = dome.clone();
            let site = Arc::clone(&config);
            let (weather, overrides) = (weather.clone(), overrides.clone());
            let (alerts, status, clock) = (alerts.clone(), status.clone(), clock.clone());
            DomeWorker::new(dome.id.clone(), move || {
                let ports = DomePorts {
                    hardware: adapters::connect(&dome, &site)?,
                    weather: weather.clone(),
                    overrides: overrides.clone(),
                    alerts: alerts.clone(),
                    status: status.clone(),
                    clock: clock.clone(),
                };
                Ok(DomeController::new(&site, dome.clone(), ports))
            })
        })
        .collect();

    // ── 5. Supervise until every loop ends ────────────────────
    // The process has no signal handling: on SIGTERM every loop stops
    // heartbeating and each enclosure closes itself.
    let supervisor = Supervisor::new(
        alerts.clone(),
        clock.clone(),
        config.restart,
        ShutdownSignal::new(),
    );
    info!("Supervising {} dome(s)", config.domes.len());

    let reports = supervisor.run(workers);
    let mut failed = 0usize;
    for report in &reports {
        match &report.exit {
            WorkerExit::Shutdown => info!(
                "{}: stopped (restarts: {})",
                report.dome_id, report.restarts
            ),
            WorkerExit::Failed(failure) => {
                failed += 1;
                error!(
                    "{}: stopped after failure: {} (restarts: {})",
                    report.dome_id, failure.message, report.restarts
                );
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} dome loop(s) stopped after failures");
    }
    Ok(())
}
