// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Station configuration
//!
//! Static configuration consumed by the pipeline components. Defaults match
//! the reference station: 15 minute measurement interval, 5 second frame
//! deadline, 40 network polls at 500 ms, PM2.5/PM10 alerts at 150/254 µg/m³.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Master configuration for a station.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station identity, used in topics and payloads.
    pub station: StationIdentity,

    /// Network link credentials and retry budget.
    pub network: NetworkConfig,

    /// Message broker address and credentials.
    pub broker: BrokerConfig,

    /// Topic names. Empty topics are derived from the station id.
    pub topics: TopicConfig,

    /// Measurement scheduling.
    pub measurement: MeasurementConfig,

    /// Per-sensor calibration.
    pub calibration: CalibrationConfig,

    /// Alert thresholds.
    pub alerts: AlertThresholds,

    /// Secondary exporter hook.
    pub exporter: ExporterConfig,
}

impl StationConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.finalize()
    }

    /// Derive empty topics from the station id, then validate.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        self.topics.fill_defaults(&self.station.id);
        self.validate()?;
        Ok(self)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every value the pipeline relies on is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.station.id.trim().is_empty() {
            return Err(invalid("station.id", "must not be empty"));
        }
        if self.network.max_attempts == 0 {
            return Err(invalid("network.max_attempts", "must be at least 1"));
        }
        if self.broker.port == 0 {
            return Err(invalid("broker.port", "must be non-zero"));
        }
        if self.broker.host.trim().is_empty() {
            return Err(invalid("broker.host", "must not be empty"));
        }
        if self.measurement.interval_secs == 0 {
            return Err(invalid("measurement.interval_secs", "must be non-zero"));
        }
        if self.measurement.frame_deadline_ms == 0 {
            return Err(invalid("measurement.frame_deadline_ms", "must be non-zero"));
        }
        for (field, topic) in [
            ("topics.data", &self.topics.data),
            ("topics.status", &self.topics.status),
            ("topics.config", &self.topics.config),
        ] {
            if topic.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if !self.calibration.gas_factor.is_finite() {
            return Err(invalid("calibration.gas_factor", "must be finite"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Station identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationIdentity {
    /// Unique station id, also the broker client id.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,
}

impl Default for StationIdentity {
    fn default() -> Self {
        Self {
            id: "STATION_001".to_string(),
            name: "My Air Quality Station".to_string(),
            latitude: 40.1895,
            longitude: 29.0244,
        }
    }
}

/// Network link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name.
    pub ssid: String,

    /// Network passphrase.
    pub password: String,

    /// Association polls per `ensure_connected` call.
    pub max_attempts: u32,

    /// Delay between association polls (ms).
    pub attempt_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: "your_ssid".to_string(),
            password: "your_password".to_string(),
            max_attempts: 40,
            attempt_delay_ms: 500,
        }
    }
}

impl NetworkConfig {
    /// Delay between association polls.
    pub fn attempt_delay(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }
}

/// Message broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,

    /// Broker TCP port.
    pub port: u16,

    /// User name.
    pub username: String,

    /// Password.
    pub password: String,

    /// Keep-alive interval (s).
    pub keep_alive_secs: u64,

    /// Upper bound on one connect attempt (ms).
    pub connect_timeout_ms: u64,

    /// Time spent draining inbound messages per tick (ms).
    pub poll_budget_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "mqtt.example.com".to_string(),
            port: 1883,
            username: "mqtt_user".to_string(),
            password: "mqtt_pass".to_string(),
            keep_alive_secs: 15,
            connect_timeout_ms: 3000,
            poll_budget_ms: 10,
        }
    }
}

impl BrokerConfig {
    /// Upper bound on one connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Time spent draining inbound messages per tick.
    pub fn poll_budget(&self) -> Duration {
        Duration::from_millis(self.poll_budget_ms)
    }
}

/// Topic names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Outbound telemetry.
    pub data: String,

    /// Presence announcements and inbound status.
    pub status: String,

    /// Inbound configuration/control.
    pub config: String,
}

impl TopicConfig {
    /// Default topics for a station id.
    pub fn for_station(station_id: &str) -> Self {
        Self {
            data: format!("aqi/{}/data", station_id),
            status: format!("aqi/{}/status", station_id),
            config: format!("aqi/{}/config", station_id),
        }
    }

    /// Replace empty topics with the station defaults.
    pub fn fill_defaults(&mut self, station_id: &str) {
        let defaults = Self::for_station(station_id);
        if self.data.is_empty() {
            self.data = defaults.data;
        }
        if self.status.is_empty() {
            self.status = defaults.status;
        }
        if self.config.is_empty() {
            self.config = defaults.config;
        }
    }

    /// Control topics the session subscribes to, in subscription order.
    pub fn control_topics(&self) -> [&str; 2] {
        [self.config.as_str(), self.status.as_str()]
    }
}

/// Measurement scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Interval between measurement cycles (s).
    pub interval_secs: u64,

    /// Sleep between scheduler ticks (ms).
    pub loop_delay_ms: u64,

    /// Particulate frame deadline (ms).
    pub frame_deadline_ms: u64,

    /// Run the first cycle on the first tick instead of one interval later.
    pub measure_on_start: bool,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900, // 15 minutes
            loop_delay_ms: 100,
            frame_deadline_ms: 5000,
            measure_on_start: false,
        }
    }
}

impl MeasurementConfig {
    /// Interval between measurement cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Sleep between scheduler ticks.
    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }

    /// Particulate frame deadline.
    pub fn frame_deadline(&self) -> Duration {
        Duration::from_millis(self.frame_deadline_ms)
    }
}

/// Per-sensor calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Added to the primary temperature (°C).
    pub temperature_offset: f32,

    /// Added to relative humidity (%).
    pub humidity_offset: f32,

    /// Multiplier on the rescaled gas value.
    pub gas_factor: f32,

    /// Added to both particulate concentrations (µg/m³).
    pub pm_offset: f32,

    /// Sea-level reference pressure for altitude (hPa).
    pub sea_level_hpa: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            temperature_offset: 0.0,
            humidity_offset: 0.0,
            gas_factor: 1.0,
            pm_offset: 0.0,
            sea_level_hpa: 1013.25,
        }
    }
}

/// Alert thresholds (µg/m³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// PM2.5 alert level.
    pub pm2_5: f32,

    /// PM10 alert level.
    pub pm10: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            pm2_5: 150.0,
            pm10: 254.0,
        }
    }
}

/// Secondary time-series exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Invoke the exporter after each publish.
    pub enabled: bool,

    /// Database host.
    pub host: String,

    /// Database port.
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Measurement name for line-protocol records.
    pub measurement: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "influxdb.example.com".to_string(),
            port: 8086,
            database: "aqi_measurements".to_string(),
            measurement: "air_quality".to_string(),
        }
    }
}
