// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Analog gas sensor adapter

use super::{Measurement, SensorAdapter};
use crate::error::SensorError;
use crate::reading::SensorSource;

/// Largest value of the 12-bit ADC
pub const ADC_MAX: u16 = 4095;

/// Top of the gas output scale
pub const GAS_SCALE_MAX: i64 = 500;

/// Black-box analog input
pub trait AnalogDriver {
    /// One raw ADC sample, `None` if the conversion failed
    fn read_raw(&mut self) -> Option<u16>;
}

/// Integer range mapping of a raw ADC sample onto `0..=GAS_SCALE_MAX`
pub fn rescale_adc(raw: u16) -> i64 {
    i64::from(raw) * GAS_SCALE_MAX / i64::from(ADC_MAX)
}

/// Gas sensor adapter
pub struct GasSensor<D> {
    driver: D,
    factor: f32,
}

impl<D: AnalogDriver> GasSensor<D> {
    /// Create an adapter with a unit calibration factor
    pub fn new(driver: D) -> Self {
        Self::with_factor(driver, 1.0)
    }

    /// Create an adapter with a calibration multiplier
    pub fn with_factor(driver: D, factor: f32) -> Self {
        Self { driver, factor }
    }
}

impl<D: AnalogDriver> SensorAdapter for GasSensor<D> {
    fn source(&self) -> SensorSource {
        SensorSource::Gas
    }

    fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
        let raw = self
            .driver
            .read_raw()
            .ok_or_else(|| SensorError::ReadFailure("ADC conversion failed".to_string()))?;

        if raw > ADC_MAX {
            return Err(SensorError::OutOfRange {
                value: u32::from(raw),
                max: u32::from(ADC_MAX),
            });
        }

        // Truncation toward zero, matching the int cast on the device
        let ppm = (rescale_adc(raw) as f32 * self.factor) as i32;
        Ok(Measurement::Gas { ppm, raw })
    }
}
