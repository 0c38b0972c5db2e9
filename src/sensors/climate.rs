// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Temperature/humidity adapter

use super::{Measurement, SensorAdapter};
use crate::error::SensorError;
use crate::reading::SensorSource;

/// Black-box temperature/humidity driver.
///
/// A failed read is signalled by NaN, as the single-wire drivers do.
pub trait ClimateDriver {
    /// Temperature (°C), NaN on failure
    fn read_temperature(&mut self) -> f32;

    /// Relative humidity (%), NaN on failure
    fn read_humidity(&mut self) -> f32;
}

/// Climate sensor adapter with additive calibration
pub struct ClimateSensor<D> {
    driver: D,
    temperature_offset: f32,
    humidity_offset: f32,
}

impl<D: ClimateDriver> ClimateSensor<D> {
    /// Create an adapter without calibration
    pub fn new(driver: D) -> Self {
        Self::with_offsets(driver, 0.0, 0.0)
    }

    /// Create an adapter with temperature and humidity offsets
    pub fn with_offsets(driver: D, temperature_offset: f32, humidity_offset: f32) -> Self {
        Self {
            driver,
            temperature_offset,
            humidity_offset,
        }
    }

    /// Access the wrapped driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: ClimateDriver> SensorAdapter for ClimateSensor<D> {
    fn source(&self) -> SensorSource {
        SensorSource::Climate
    }

    fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
        let temperature = self.driver.read_temperature();
        let humidity = self.driver.read_humidity();

        if temperature.is_nan() || humidity.is_nan() {
            return Err(SensorError::ReadFailure(
                "temperature/humidity driver returned NaN".to_string(),
            ));
        }

        Ok(Measurement::Climate {
            temperature_c: temperature + self.temperature_offset,
            humidity_pct: humidity + self.humidity_offset,
        })
    }
}
