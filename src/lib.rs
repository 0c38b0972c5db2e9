//! # AQI Station - Air-quality telemetry station
//!
//! Acquisition-and-delivery pipeline for a periodic environmental telemetry
//! agent running on a constrained device.
//!
//! ## Key Features
//!
//! - **Frame decoding**: sync-delimited 32-byte particulate frames under a hard deadline
//! - **Failure isolation**: one composite reading per cycle, with a quality bit per failed source
//! - **Self-healing links**: network and broker session recover on the next tick, never stalling the loop
//! - **Bounded blocking**: every wait is capped by a deadline or an attempt budget
//!
//! ## Quick Start
//!
//! ```rust
//! use aqi_station::clock::ManualClock;
//! use aqi_station::frame::{encode_frame, FrameDecoder};
//! use std::collections::VecDeque;
//!
//! let clock = ManualClock::new();
//! let mut uart: VecDeque<u8> = encode_frame(150, 300).into_iter().collect();
//!
//! let frame = FrameDecoder::new(&clock).decode(&mut uart).unwrap();
//! assert_eq!(frame.pm2_5(0.0), 15.0);
//! assert_eq!(frame.pm10(0.0), 30.0);
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Particulate frame decoder
//! - [`sensors`]: Sensor adapters over black-box drivers
//! - [`aggregator`]: Composite reading with quality mask
//! - [`network`]: Network link manager
//! - [`session`]: Messaging session manager
//! - [`publisher`]: Telemetry payload and publish
//! - [`monitor`]: Alert thresholds
//! - [`exporter`]: Secondary exporter hook
//! - [`scheduler`]: The station loop

// Modules
pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod exporter;
pub mod frame;
pub mod monitor;
pub mod network;
pub mod publisher;
pub mod reading;
pub mod retry;
pub mod scheduler;
pub mod sensors;
pub mod session;

// Re-exports for convenient access
pub use aggregator::Aggregator;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AlertThresholds, StationConfig};
pub use error::{
    BrokerError, ConfigError, ConnectError, DecodeError, ExportError, PublishError, Result,
    SensorError, StationError,
};
pub use exporter::{LineProtocolExporter, SecondaryExporter};
pub use frame::{ByteSource, Frame32, FrameDecoder};
pub use monitor::{check_thresholds, AlertMetric, AlertNotice};
pub use network::{ConnectionState, Credentials, NetworkLink, NetworkManager};
pub use publisher::{Publisher, PublisherStats, TelemetryPayload};
pub use reading::{CompositeReading, QualityMask, SensorSource};
pub use retry::RetryStrategy;
pub use scheduler::{CycleReport, Station, TickReport};
pub use sensors::{Measurement, SensorAdapter};
pub use session::{BrokerClient, InboundMessage, SessionManager, SessionOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
