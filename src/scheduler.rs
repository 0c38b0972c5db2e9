// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Station scheduler
//!
//! [`Station`] owns every component and drives them from one cooperative
//! loop. Each [`Station::tick`]:
//!
//! 1. re-checks the network link and reconnects it if needed
//! 2. brings the messaging session up (or notices it must be rebuilt)
//! 3. services inbound control messages
//! 4. when the measurement interval has elapsed, runs
//!    aggregate → monitor → publish → export and restarts the interval
//!
//! Nothing in a tick is fatal. [`Station::run`] repeats ticks forever.

use crate::aggregator::Aggregator;
use crate::clock::SharedClock;
use crate::config::StationConfig;
use crate::error::{ConnectError, PublishError, Result};
use crate::exporter::{LineProtocolExporter, SecondaryExporter};
use crate::monitor::{check_thresholds, AlertNotice};
use crate::network::{ConnectionState, NetworkLink, NetworkManager};
use crate::publisher::Publisher;
use crate::reading::CompositeReading;
use crate::sensors::SensorAdapter;
use crate::session::{BrokerClient, SessionManager};
use log::{debug, info, warn};
use std::time::Duration;

/// Outcome of one measurement cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Reading produced by the aggregator
    pub reading: CompositeReading,
    /// Threshold notices for the reading
    pub alerts: Vec<AlertNotice>,
    /// Publish outcome
    pub publish: std::result::Result<(), PublishError>,
}

/// Outcome of one scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Network state at the end of the tick
    pub network: ConnectionState,
    /// Session state at the end of the tick
    pub session: ConnectionState,
    /// Inbound control messages serviced
    pub inbound: usize,
    /// Present when a measurement cycle ran
    pub cycle: Option<CycleReport>,
}

/// The whole telemetry station
pub struct Station<L, B> {
    config: StationConfig,
    clock: SharedClock,
    network: NetworkManager<L>,
    session: SessionManager<B>,
    aggregator: Aggregator,
    publisher: Publisher,
    exporter: Option<Box<dyn SecondaryExporter>>,
    last_measurement: Duration,
    measurement_pending: bool,
    ticks: u64,
}

impl<L: NetworkLink, B: BrokerClient> Station<L, B> {
    /// Assemble a station.
    ///
    /// The configuration is validated here; this is the only fallible step.
    /// A line-protocol exporter is installed when the exporter is enabled.
    pub fn new(
        config: StationConfig,
        link: L,
        broker: B,
        adapters: Vec<Box<dyn SensorAdapter>>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let network = NetworkManager::new(link, &config.network, clock.clone());
        let session = SessionManager::new(broker, &config);
        let aggregator = Aggregator::new(adapters, clock.clone());
        let publisher = Publisher::new(&config, clock.clone());
        let exporter: Option<Box<dyn SecondaryExporter>> = if config.exporter.enabled {
            Some(Box::new(LineProtocolExporter::new(config.exporter.clone())))
        } else {
            None
        };

        info!(
            "[station] {} ({}) ready, interval {}s",
            config.station.id, config.station.name, config.measurement.interval_secs
        );

        Ok(Self {
            last_measurement: clock.now(),
            measurement_pending: config.measurement.measure_on_start,
            config,
            clock,
            network,
            session,
            aggregator,
            publisher,
            exporter,
            ticks: 0,
        })
    }

    /// Replace the secondary exporter
    pub fn with_exporter(mut self, exporter: Box<dyn SecondaryExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Station configuration
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Network manager
    pub fn network(&self) -> &NetworkManager<L> {
        &self.network
    }

    /// Mutable network manager
    pub fn network_mut(&mut self) -> &mut NetworkManager<L> {
        &mut self.network
    }

    /// Session manager
    pub fn session(&self) -> &SessionManager<B> {
        &self.session
    }

    /// Mutable session manager
    pub fn session_mut(&mut self) -> &mut SessionManager<B> {
        &mut self.session
    }

    /// Aggregator
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Publisher
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the next tick runs a measurement cycle
    pub fn measurement_due(&self) -> bool {
        self.measurement_pending
            || self.clock.now().saturating_sub(self.last_measurement)
                >= self.config.measurement.interval()
    }

    /// Run one iteration of the loop
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;

        self.network.refresh();
        if !self.network.state().is_connected() {
            if let Err(e) = self.network.ensure_connected() {
                debug!("[station] network: {}", e);
            }
        }

        match self.session.ensure_connected(&self.network) {
            Ok(()) => {}
            Err(ConnectError::NetworkDown) => debug!("[station] session waits for network"),
            Err(e) => debug!("[station] session: {}", e),
        }

        let inbound = self.session.service();

        let cycle = if self.measurement_due() {
            Some(self.run_cycle())
        } else {
            None
        };

        TickReport {
            network: self.network.state(),
            session: self.session.state(),
            inbound,
            cycle,
        }
    }

    /// Acquire, check, publish and export one reading
    fn run_cycle(&mut self) -> CycleReport {
        info!("[cycle] acquiring sensor data");
        let reading = self.aggregator.acquire();

        let alerts = check_thresholds(&reading, &self.config.alerts);
        for alert in &alerts {
            warn!("[alert] {}", alert);
        }

        let rssi = self.network.signal_strength();
        log_summary(&reading, rssi);

        let publish = self.publisher.publish(&reading, &mut self.session, rssi);

        if let Some(exporter) = self.exporter.as_mut() {
            if let Err(e) = exporter.export(&self.config.station.id, &reading) {
                warn!("[export] {} failed: {}", exporter.name(), e);
            }
        }

        self.last_measurement = self.clock.now();
        self.measurement_pending = false;

        CycleReport {
            reading,
            alerts,
            publish,
        }
    }

    /// Tick forever with the configured loop delay
    pub fn run(&mut self) -> ! {
        let delay = self.config.measurement.loop_delay();
        loop {
            self.tick();
            self.clock.sleep(delay);
        }
    }
}

fn log_summary(reading: &CompositeReading, rssi: Option<i32>) {
    info!(
        "[cycle] pm2.5={:.1} pm10={:.1} temp={:.1}C hum={:.1}% pressure={:.1}hPa alt={:.1}m gas={:.0}ohm ppm={} rssi={} quality={}",
        reading.pm2_5,
        reading.pm10,
        reading.temperature_primary,
        reading.humidity,
        reading.pressure_hpa,
        reading.altitude_m,
        reading.gas_resistance_ohm,
        reading.gas_ppm,
        rssi.map(|r| format!("{}dBm", r)).unwrap_or_else(|| "n/a".to_string()),
        reading.quality_mask
    );
}
