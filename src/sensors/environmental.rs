// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Environmental multi-sensor adapter

use super::{Measurement, SensorAdapter};
use crate::error::SensorError;
use crate::reading::SensorSource;

/// Raw sample from the environmental driver, in driver-native units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentalSample {
    /// Temperature (°C)
    pub temperature_c: f32,
    /// Pressure (Pa)
    pub pressure_pa: f32,
    /// Gas heater resistance (Ω)
    pub gas_resistance_ohm: f32,
}

/// Black-box environmental driver
pub trait EnvironmentalDriver {
    /// Trigger a forced-mode measurement, `None` if it failed
    fn perform_reading(&mut self) -> Option<EnvironmentalSample>;
}

/// Altitude (m) from pressure using the international barometric formula
pub fn altitude_from_pressure(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(0.1903))
}

/// Environmental sensor adapter
pub struct EnvironmentalSensor<D> {
    driver: D,
    sea_level_hpa: f32,
}

impl<D: EnvironmentalDriver> EnvironmentalSensor<D> {
    /// Standard sea-level pressure (hPa)
    pub const STANDARD_SEA_LEVEL_HPA: f32 = 1013.25;

    /// Create an adapter referenced to standard sea-level pressure
    pub fn new(driver: D) -> Self {
        Self::with_sea_level(driver, Self::STANDARD_SEA_LEVEL_HPA)
    }

    /// Create an adapter with a local sea-level reference
    pub fn with_sea_level(driver: D, sea_level_hpa: f32) -> Self {
        Self {
            driver,
            sea_level_hpa,
        }
    }
}

impl<D: EnvironmentalDriver> SensorAdapter for EnvironmentalSensor<D> {
    fn source(&self) -> SensorSource {
        SensorSource::Environmental
    }

    fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
        let sample = self
            .driver
            .perform_reading()
            .ok_or_else(|| SensorError::ReadFailure("environmental reading failed".to_string()))?;

        if !sample.pressure_pa.is_finite() || sample.pressure_pa <= 0.0 {
            return Err(SensorError::ReadFailure(format!(
                "invalid pressure {}",
                sample.pressure_pa
            )));
        }
        if !sample.temperature_c.is_finite() {
            return Err(SensorError::ReadFailure(format!(
                "invalid temperature {}",
                sample.temperature_c
            )));
        }
        if !sample.gas_resistance_ohm.is_finite() {
            return Err(SensorError::ReadFailure(format!(
                "invalid gas resistance {}",
                sample.gas_resistance_ohm
            )));
        }

        let pressure_hpa = sample.pressure_pa / 100.0;
        Ok(Measurement::Environmental {
            temperature_c: sample.temperature_c,
            pressure_hpa,
            altitude_m: altitude_from_pressure(pressure_hpa, self.sea_level_hpa),
            gas_resistance_ohm: sample.gas_resistance_ohm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct FixedDriver(Option<EnvironmentalSample>);

    impl EnvironmentalDriver for FixedDriver {
        fn perform_reading(&mut self) -> Option<EnvironmentalSample> {
            self.0
        }
    }

    #[test]
    fn test_altitude_at_sea_level() {
        assert_abs_diff_eq!(altitude_from_pressure(1013.25, 1013.25), 0.0, epsilon = 1e-3);
        // ~111 m at 1000 hPa
        assert_abs_diff_eq!(altitude_from_pressure(1000.0, 1013.25), 110.9, epsilon = 0.5);
    }

    #[test]
    fn test_pressure_converted_to_hpa() {
        let mut sensor = EnvironmentalSensor::new(FixedDriver(Some(EnvironmentalSample {
            temperature_c: 22.4,
            pressure_pa: 101_325.0,
            gas_resistance_ohm: 48_000.0,
        })));

        match sensor.attempt_read().unwrap() {
            Measurement::Environmental {
                temperature_c,
                pressure_hpa,
                altitude_m,
                gas_resistance_ohm,
            } => {
                assert_eq!(temperature_c, 22.4);
                assert_abs_diff_eq!(pressure_hpa, 1013.25, epsilon = 1e-3);
                assert_abs_diff_eq!(altitude_m, 0.0, epsilon = 0.01);
                assert_eq!(gas_resistance_ohm, 48_000.0);
            }
            other => panic!("unexpected measurement {:?}", other),
        }
    }

    #[test]
    fn test_failed_reading() {
        let mut sensor = EnvironmentalSensor::new(FixedDriver(None));
        assert!(sensor.attempt_read().is_err());
    }

    #[test]
    fn test_invalid_pressure() {
        let mut sensor = EnvironmentalSensor::new(FixedDriver(Some(EnvironmentalSample {
            temperature_c: 20.0,
            pressure_pa: f32::NAN,
            gas_resistance_ohm: 1.0,
        })));
        assert!(matches!(
            sensor.attempt_read(),
            Err(SensorError::ReadFailure(_))
        ));
    }

    #[test]
    fn test_non_finite_temperature() {
        let mut sensor = EnvironmentalSensor::new(FixedDriver(Some(EnvironmentalSample {
            temperature_c: f32::NAN,
            pressure_pa: 101_325.0,
            gas_resistance_ohm: 48_000.0,
        })));
        assert!(matches!(
            sensor.attempt_read(),
            Err(SensorError::ReadFailure(_))
        ));
    }

    #[test]
    fn test_non_finite_gas_resistance() {
        for gas in [f32::NAN, f32::INFINITY] {
            let mut sensor = EnvironmentalSensor::new(FixedDriver(Some(EnvironmentalSample {
                temperature_c: 20.0,
                pressure_pa: 101_325.0,
                gas_resistance_ohm: gas,
            })));
            assert!(matches!(
                sensor.attempt_read(),
                Err(SensorError::ReadFailure(_))
            ));
        }
    }
}
