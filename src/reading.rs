// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Composite reading and quality mask
//!
//! A [`CompositeReading`] is one measurement cycle merged across all
//! sensors. Fields of a source that failed this cycle keep their previous
//! value; the matching [`QualityMask`] bit tells consumers not to trust
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical sensor sources, in acquisition order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorSource {
    /// Digital temperature/humidity sensor
    Climate,
    /// Analog gas sensor
    Gas,
    /// UART particulate sensor
    Particulate,
    /// I2C environmental multi-sensor
    Environmental,
}

impl SensorSource {
    /// All sources in the order the aggregator reads them
    pub const ACQUISITION_ORDER: [SensorSource; 4] = [
        SensorSource::Climate,
        SensorSource::Gas,
        SensorSource::Particulate,
        SensorSource::Environmental,
    ];

    /// Quality bit raised when this source fails.
    ///
    /// The analog gas sensor shares the environmental bit: both report air
    /// chemistry, and the mask carries three failure groups.
    pub const fn quality_bit(&self) -> u8 {
        match self {
            Self::Particulate => QualityMask::PARTICULATE,
            Self::Climate => QualityMask::CLIMATE,
            Self::Environmental | Self::Gas => QualityMask::ENVIRONMENTAL,
        }
    }

    /// Short name for logs
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Gas => "gas",
            Self::Particulate => "particulate",
            Self::Environmental => "environmental",
        }
    }
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source failure flags; zero means every source read cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityMask(u8);

impl QualityMask {
    /// Particulate frame missing or garbled
    pub const PARTICULATE: u8 = 0b0000_0001;
    /// Temperature/humidity read failed
    pub const CLIMATE: u8 = 0b0000_0010;
    /// Environmental or gas read failed
    pub const ENVIRONMENTAL: u8 = 0b0000_0100;

    /// Mask with no failures
    pub const fn valid() -> Self {
        Self(0)
    }

    /// Mask from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Raise the bit for a failed source
    pub fn mark_failed(&mut self, source: SensorSource) {
        self.0 |= source.quality_bit();
    }

    /// Whether the bit for `source` is raised
    pub fn has_failed(&self, source: SensorSource) -> bool {
        self.0 & source.quality_bit() != 0
    }

    /// True when no bit is raised
    pub fn is_valid(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for QualityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}

/// One cycle's merged output across all sensors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeReading {
    /// PM2.5 concentration (µg/m³)
    pub pm2_5: f32,
    /// PM10 concentration (µg/m³)
    pub pm10: f32,
    /// Temperature from the climate sensor (°C)
    pub temperature_primary: f32,
    /// Relative humidity (%)
    pub humidity: f32,
    /// Temperature from the environmental sensor (°C)
    pub temperature_secondary: f32,
    /// Barometric pressure (hPa)
    pub pressure_hpa: f32,
    /// Altitude derived from pressure (m)
    pub altitude_m: f32,
    /// Gas heater resistance (Ω)
    pub gas_resistance_ohm: f32,
    /// Gas concentration estimate
    pub gas_ppm: i32,
    /// Time the cycle finished acquiring
    pub acquired_at: DateTime<Utc>,
    /// Failed sources this cycle
    pub quality_mask: QualityMask,
}

impl CompositeReading {
    /// All-zero reading, used before the first successful cycle
    pub fn zeroed(acquired_at: DateTime<Utc>) -> Self {
        Self {
            pm2_5: 0.0,
            pm10: 0.0,
            temperature_primary: 0.0,
            humidity: 0.0,
            temperature_secondary: 0.0,
            pressure_hpa: 0.0,
            altitude_m: 0.0,
            gas_resistance_ohm: 0.0,
            gas_ppm: 0,
            acquired_at,
            quality_mask: QualityMask::valid(),
        }
    }

    /// Check whether fields from `source` can be trusted
    pub fn is_trusted(&self, source: SensorSource) -> bool {
        !self.quality_mask.has_failed(source)
    }
}

impl Default for CompositeReading {
    fn default() -> Self {
        Self::zeroed(DateTime::<Utc>::default())
    }
}

/// Round to `decimals` places, half away from zero
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = 10f32.powi(decimals);
    (value * scale).round() / scale
}
