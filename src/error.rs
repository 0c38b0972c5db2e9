// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the station
//!
//! Every failure in the acquisition and delivery pipeline is a value. None of
//! these errors stop the measurement loop; each is converted into a quality
//! bit or a skipped transmission at the boundary where it occurs.

use thiserror::Error;

/// Result type alias for station setup operations
pub type Result<T> = std::result::Result<T, StationError>;

/// Top-level error, only surfaced while building a station
#[derive(Error, Debug)]
pub enum StationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Errors from the particulate frame decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No complete frame arrived before the deadline.
    ///
    /// Covers both "marker never seen" and "marker seen, frame stalled".
    #[error("Frame not completed within {deadline_ms}ms")]
    Timeout { deadline_ms: u64 },
}

/// Errors from a single sensor acquisition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Driver returned an invalid (NaN) value or signalled failure
    #[error("Read failure: {0}")]
    ReadFailure(String),

    /// Driver returned a value outside its native range
    #[error("Value {value} outside range 0..={max}")]
    OutOfRange { value: u32, max: u32 },

    /// Particulate frame could not be decoded
    #[error("Frame decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Connection failures, for both the network link and the broker session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Network association did not complete within the attempt cap
    #[error("Network not associated after {attempts} attempts")]
    LinkTimeout { attempts: u32 },

    /// Session connect requested while the network link is down
    #[error("Network link is down")]
    NetworkDown,

    /// Broker refused the connection
    #[error("Broker refused connection (rc={code})")]
    BrokerRefused { code: i32 },

    /// Transport failure while connecting
    #[error("Transport failure: {0}")]
    Transport(#[from] BrokerError),

    /// Mandatory post-connect step failed
    #[error("Session setup failed on {topic}: {reason}")]
    Setup { topic: String, reason: String },
}

/// Failures reported by a broker client implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Connection refused with a CONNACK return code
    #[error("Connection refused (rc={0})")]
    Refused(i32),

    /// Connection attempt or request timed out
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection lost or unusable
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// Request could not be queued or written
    #[error("Request failed: {0}")]
    Request(String),
}

impl BrokerError {
    /// Numeric state code in the PubSubClient convention.
    ///
    /// Positive codes are CONNACK refusals, negative codes are transport
    /// failures.
    pub fn state_code(&self) -> i32 {
        match self {
            Self::Refused(code) => *code,
            Self::Timeout { .. } => -4,
            Self::Disconnected { .. } => -3,
            Self::Request(_) => -2,
        }
    }
}

/// Errors while publishing a reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Messaging session is not connected
    #[error("Messaging session not connected")]
    NotConnected,

    /// Payload serialization failed
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Broker client rejected the publish
    #[error("Publish rejected: {0}")]
    Rejected(#[from] BrokerError),
}

/// Errors from the secondary exporter hook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Exporter is not enabled
    #[error("Exporter disabled")]
    Disabled,

    /// Record could not be rendered
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema
    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an invalid value
    #[error("Invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
