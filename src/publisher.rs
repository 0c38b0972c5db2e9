// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry publisher
//!
//! Serializes a [`CompositeReading`] into the JSON telemetry document and
//! submits it on the station's data topic. Publishing is best-effort: there
//! is no internal retry and nothing is queued, the next cycle's reading
//! supersedes a lost one.
//!
//! ## Payload
//!
//! ```json
//! {
//!   "station_id": "STATION_001",
//!   "station_name": "Rooftop",
//!   "timestamp": 1700000000,
//!   "uptime_sec": 900,
//!   "measurements": {
//!     "pm25": 15.0, "pm10": 30.0, "temperature": 21.5, "humidity": 40.2,
//!     "pressure": 1013.25, "altitude": 0.0, "gas_resistance": 48000.0, "ppm": 61
//!   },
//!   "quality": { "flag": 0, "wifi_rssi": -61 }
//! }
//! ```

use crate::clock::SharedClock;
use crate::config::StationConfig;
use crate::error::PublishError;
use crate::reading::{round_to, CompositeReading};
use crate::session::{BrokerClient, SessionManager};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire document for one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Station identifier
    pub station_id: String,
    /// Human-readable station name
    pub station_name: String,
    /// Acquisition time, Unix seconds
    pub timestamp: i64,
    /// Seconds since the station started
    pub uptime_sec: u64,
    /// Rounded measurement values
    pub measurements: PayloadMeasurements,
    /// Quality annotation
    pub quality: PayloadQuality,
}

/// Measurement group of the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMeasurements {
    /// PM2.5 (µg/m³)
    pub pm25: f32,
    /// PM10 (µg/m³)
    pub pm10: f32,
    /// Primary temperature (°C)
    pub temperature: f32,
    /// Relative humidity (%)
    pub humidity: f32,
    /// Pressure (hPa), two decimals
    pub pressure: f32,
    /// Altitude (m)
    pub altitude: f32,
    /// Gas heater resistance (Ω)
    pub gas_resistance: f32,
    /// Gas concentration estimate
    pub ppm: i32,
}

/// Quality group of the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadQuality {
    /// Quality mask bits
    pub flag: u8,
    /// Link signal strength (dBm), null when unknown
    pub wifi_rssi: Option<i32>,
}

impl TelemetryPayload {
    /// Build the payload for a reading
    pub fn from_reading(
        station_id: &str,
        station_name: &str,
        reading: &CompositeReading,
        uptime: Duration,
        rssi: Option<i32>,
    ) -> Self {
        Self {
            station_id: station_id.to_string(),
            station_name: station_name.to_string(),
            timestamp: reading.acquired_at.timestamp(),
            uptime_sec: uptime.as_secs(),
            measurements: PayloadMeasurements {
                pm25: round_to(reading.pm2_5, 1),
                pm10: round_to(reading.pm10, 1),
                temperature: round_to(reading.temperature_primary, 1),
                humidity: round_to(reading.humidity, 1),
                pressure: round_to(reading.pressure_hpa, 2),
                altitude: round_to(reading.altitude_m, 1),
                gas_resistance: reading.gas_resistance_ohm,
                ppm: reading.gas_ppm,
            },
            quality: PayloadQuality {
                flag: reading.quality_mask.bits(),
                wifi_rssi: rssi,
            },
        }
    }
}

/// Publisher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Payloads serialized
    pub payloads_encoded: u64,
    /// Payloads accepted by the broker client
    pub published: u64,
    /// Publishes rejected after encoding
    pub failed: u64,
    /// Cycles skipped because the session was down
    pub skipped: u64,
}

/// Publishes composite readings on the data topic
pub struct Publisher {
    station_id: String,
    station_name: String,
    topic: String,
    clock: SharedClock,
    started: Duration,
    stats: PublisherStats,
}

impl Publisher {
    /// Create a publisher; uptime is counted from now
    pub fn new(config: &StationConfig, clock: SharedClock) -> Self {
        let started = clock.now();
        Self {
            station_id: config.station.id.clone(),
            station_name: config.station.name.clone(),
            topic: config.topics.data.clone(),
            clock,
            started,
            stats: PublisherStats::default(),
        }
    }

    /// Data topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Statistics so far
    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    /// Time since the publisher was created
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    /// Serialize a reading to the wire document
    pub fn encode(&mut self, reading: &CompositeReading, rssi: Option<i32>) -> Result<Vec<u8>, PublishError> {
        let payload = TelemetryPayload::from_reading(
            &self.station_id,
            &self.station_name,
            reading,
            self.uptime(),
            rssi,
        );
        let bytes =
            serde_json::to_vec(&payload).map_err(|e| PublishError::Serialize(e.to_string()))?;
        self.stats.payloads_encoded += 1;
        Ok(bytes)
    }

    /// Publish a reading through the session.
    ///
    /// Returns [`PublishError::NotConnected`] without serializing anything
    /// when the session is down.
    pub fn publish<B: BrokerClient>(
        &mut self,
        reading: &CompositeReading,
        session: &mut SessionManager<B>,
        rssi: Option<i32>,
    ) -> Result<(), PublishError> {
        if !session.is_connected() {
            self.stats.skipped += 1;
            warn!("[publish] session down, skipping this cycle");
            return Err(PublishError::NotConnected);
        }

        let payload = self.encode(reading, rssi)?;
        match session.publish(&self.topic, &payload) {
            Ok(()) => {
                self.stats.published += 1;
                info!("[publish] {} bytes on {}", payload.len(), self.topic);
                Ok(())
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!("[publish] failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::NetworkConfig;
    use crate::network::tests::MockLink;
    use crate::network::NetworkManager;
    use crate::reading::{QualityMask, SensorSource};
    use crate::session::tests::MockBroker;
    use chrono::{TimeZone, Utc};

    fn sample_reading() -> CompositeReading {
        let mut reading = CompositeReading::zeroed(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        reading.pm2_5 = 15.04;
        reading.pm10 = 30.0;
        reading.temperature_primary = 21.46;
        reading.humidity = 40.0;
        reading.pressure_hpa = 1013.256;
        reading.altitude_m = 12.34;
        reading.gas_resistance_ohm = 48_000.0;
        reading.gas_ppm = 61;
        reading.quality_mask.mark_failed(SensorSource::Climate);
        reading
    }

    fn connected_session(config: &StationConfig) -> SessionManager<MockBroker> {
        let mut network = NetworkManager::new(
            MockLink::associating_after(1),
            &NetworkConfig::default(),
            ManualClock::new().shared(),
        );
        network.ensure_connected().unwrap();
        let mut session = SessionManager::new(MockBroker::default(), config);
        session.ensure_connected(&network).unwrap();
        session
    }

    #[test]
    fn test_payload_shape() {
        let payload = TelemetryPayload::from_reading(
            "STATION_001",
            "Rooftop",
            &sample_reading(),
            Duration::from_secs(905),
            Some(-61),
        );
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["station_id"], "STATION_001");
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["uptime_sec"], 905);
        assert_eq!(json["measurements"]["ppm"], 61);
        assert_eq!(json["quality"]["flag"], QualityMask::CLIMATE);
        assert_eq!(json["quality"]["wifi_rssi"], -61);
        assert_eq!(payload.measurements.pm25, 15.0);
        assert_eq!(payload.measurements.temperature, 21.5);
        assert_eq!(payload.measurements.pressure, 1013.26);
        assert_eq!(payload.measurements.altitude, 12.3);
    }

    #[test]
    fn test_unknown_rssi_is_null() {
        let payload =
            TelemetryPayload::from_reading("S", "n", &sample_reading(), Duration::ZERO, None);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["quality"]["wifi_rssi"].is_null());
    }

    #[test]
    fn test_not_connected_skips_serialization() {
        let config = StationConfig::default().finalize().unwrap();
        let mut session = SessionManager::new(MockBroker::default(), &config);
        let mut publisher = Publisher::new(&config, ManualClock::new().shared());

        let result = publisher.publish(&sample_reading(), &mut session, None);
        assert_eq!(result, Err(PublishError::NotConnected));
        assert_eq!(publisher.stats().payloads_encoded, 0);
        assert_eq!(publisher.stats().skipped, 1);
        assert!(session.client().published.is_empty());
    }

    #[test]
    fn test_publish_on_data_topic() {
        let config = StationConfig::default().finalize().unwrap();
        let mut session = connected_session(&config);
        let clock = ManualClock::new().shared();
        let mut publisher = Publisher::new(&config, clock.clone());
        clock.advance(Duration::from_secs(900));

        publisher.publish(&sample_reading(), &mut session, Some(-70)).unwrap();

        let (topic, bytes) = session.client().published.last().unwrap();
        assert_eq!(topic, "aqi/STATION_001/data");
        let decoded: TelemetryPayload = serde_json::from_slice(bytes).unwrap();
        assert_eq!(decoded.uptime_sec, 900);
        assert_eq!(decoded.quality.wifi_rssi, Some(-70));
        assert_eq!(publisher.stats().published, 1);
    }

    #[test]
    fn test_rejected_publish_counts_failure() {
        let config = StationConfig::default().finalize().unwrap();
        let mut session = connected_session(&config);
        session.client_mut().fail_publish = true;
        let mut publisher = Publisher::new(&config, ManualClock::new().shared());

        let result = publisher.publish(&sample_reading(), &mut session, None);
        assert!(matches!(result, Err(PublishError::Rejected(_))));
        assert_eq!(publisher.stats().payloads_encoded, 1);
        assert_eq!(publisher.stats().failed, 1);
    }
}
