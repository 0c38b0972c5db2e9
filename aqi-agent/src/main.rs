// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AQI Agent
//!
//! Runs the station loop on a host: simulated sensors, the host network as
//! the link, and an MQTT broker for delivery.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults, broker on localhost
//! aqi-agent --broker-host localhost
//!
//! # Config file, measure every minute starting now
//! aqi-agent --config station.json --interval 60 --measure-on-start
//! ```

mod link;
mod mqtt;
mod sim;

use aqi_station::sensors::standard_adapters;
use aqi_station::{ConfigError, Station, StationConfig, StationError, SystemClock};
use clap::Parser;
use link::HostLink;
use mqtt::RumqttBroker;
use sim::{SimulatedAnalog, SimulatedClimate, SimulatedEnvironmental, SimulatedUart};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// AQI telemetry agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// Override the broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// Override the measurement interval (seconds)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Measure on the first tick instead of one interval after start
    #[arg(long)]
    measure_on_start: bool,

    /// Network probe timeout (milliseconds)
    #[arg(long, default_value = "500")]
    probe_timeout_ms: u64,

    /// Failure probability of each simulated sensor read
    #[arg(long, default_value = "0.05")]
    failure_rate: f64,

    /// Seed for the simulated sensors
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &Args) -> Result<StationConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => StationConfig::from_file(path)?,
        None => StationConfig::default().finalize()?,
    };

    if let Some(host) = &args.broker_host {
        config.broker.host = host.clone();
    }
    if let Some(port) = args.broker_port {
        config.broker.port = port;
    }
    if let Some(interval) = args.interval {
        config.measurement.interval_secs = interval;
    }
    if args.measure_on_start {
        config.measurement.measure_on_start = true;
    }

    config.validate()?;
    Ok(config)
}

fn build_station(args: &Args) -> Result<Station<HostLink, RumqttBroker>, StationError> {
    let config = load_config(args)?;
    let clock = SystemClock::shared();

    // Distinct streams per driver from one seed
    let seed = |offset: u64| args.seed.map(|s| s.wrapping_add(offset));
    let adapters = standard_adapters(
        SimulatedClimate::new(seed(1), args.failure_rate),
        SimulatedAnalog::new(seed(2), args.failure_rate),
        SimulatedUart::new(seed(3), args.failure_rate),
        SimulatedEnvironmental::new(seed(4), args.failure_rate),
        &config.calibration,
        &config.measurement,
        clock.clone(),
    );

    let link = HostLink::new(
        &config.broker.host,
        config.broker.port,
        Duration::from_millis(args.probe_timeout_ms),
    );

    info!(
        "Station {} -> {}:{} every {}s",
        config.station.id,
        config.broker.host,
        config.broker.port,
        config.measurement.interval_secs
    );

    Station::new(config, link, RumqttBroker::new(), adapters, clock)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("AQI Agent v{} (station v{})", env!("CARGO_PKG_VERSION"), aqi_station::VERSION);

    let mut station = match build_station(&args) {
        Ok(station) => station,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    station.run()
}
