// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Threshold monitor
//!
//! Stateless comparison of a reading against the alert thresholds. Notices
//! are informational only; the station logs them and moves on.

use crate::config::AlertThresholds;
use crate::reading::CompositeReading;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric covered by an alert threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertMetric {
    /// Fine particulate matter
    Pm2_5,
    /// Coarse particulate matter
    Pm10,
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pm2_5 => write!(f, "PM2.5"),
            Self::Pm10 => write!(f, "PM10"),
        }
    }
}

/// A metric above its threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    /// Metric that crossed its threshold
    pub metric: AlertMetric,
    /// Measured value (µg/m³)
    pub value: f32,
    /// Configured threshold (µg/m³)
    pub threshold: f32,
}

impl fmt::Display for AlertNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} HIGH: {:.1} µg/m³ (threshold {:.1})",
            self.metric, self.value, self.threshold
        )
    }
}

/// Compare a reading against the thresholds.
///
/// PM2.5 is checked before PM10 and both checks always run. A value equal
/// to its threshold does not alert.
pub fn check_thresholds(reading: &CompositeReading, thresholds: &AlertThresholds) -> Vec<AlertNotice> {
    [
        (AlertMetric::Pm2_5, reading.pm2_5, thresholds.pm2_5),
        (AlertMetric::Pm10, reading.pm10, thresholds.pm10),
    ]
    .into_iter()
    .filter(|&(_, value, threshold)| value > threshold)
    .map(|(metric, value, threshold)| AlertNotice {
        metric,
        value,
        threshold,
    })
    .collect()
}
