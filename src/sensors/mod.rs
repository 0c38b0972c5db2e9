// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor adapters
//!
//! Each adapter wraps one black-box driver and performs exactly one
//! blocking acquisition per [`SensorAdapter::attempt_read`]. Failures come
//! back as [`SensorError`] values and never escape the adapter any other
//! way.
//!
//! | Adapter | Driver seam | Transport |
//! |---------|-------------|-----------|
//! | [`ClimateSensor`] | [`ClimateDriver`] | single-wire digital |
//! | [`GasSensor`] | [`AnalogDriver`] | ADC |
//! | [`ParticulateSensor`] | [`ByteSource`](crate::frame::ByteSource) | UART frames |
//! | [`EnvironmentalSensor`] | [`EnvironmentalDriver`] | I2C |

mod climate;
mod environmental;
mod gas;
mod particulate;

pub use climate::{ClimateDriver, ClimateSensor};
pub use environmental::{altitude_from_pressure, EnvironmentalDriver, EnvironmentalSample, EnvironmentalSensor};
pub use gas::{rescale_adc, AnalogDriver, GasSensor, ADC_MAX, GAS_SCALE_MAX};
pub use particulate::ParticulateSensor;

use crate::clock::SharedClock;
use crate::config::{CalibrationConfig, MeasurementConfig};
use crate::error::SensorError;
use crate::frame::ByteSource;
use crate::reading::{CompositeReading, SensorSource};

/// Typed result of one successful acquisition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Temperature and relative humidity
    Climate {
        /// Calibrated temperature (°C)
        temperature_c: f32,
        /// Calibrated relative humidity (%)
        humidity_pct: f32,
    },
    /// Gas concentration estimate
    Gas {
        /// Rescaled, calibrated value
        ppm: i32,
        /// Raw ADC sample
        raw: u16,
    },
    /// Particulate concentrations
    Particulate {
        /// PM2.5 (µg/m³), one decimal
        pm2_5: f32,
        /// PM10 (µg/m³), one decimal
        pm10: f32,
    },
    /// Environmental multi-sensor sample
    Environmental {
        /// Temperature (°C)
        temperature_c: f32,
        /// Pressure (hPa)
        pressure_hpa: f32,
        /// Altitude (m)
        altitude_m: f32,
        /// Gas heater resistance (Ω)
        gas_resistance_ohm: f32,
    },
}

impl Measurement {
    /// Source that produced this measurement
    pub fn source(&self) -> SensorSource {
        match self {
            Self::Climate { .. } => SensorSource::Climate,
            Self::Gas { .. } => SensorSource::Gas,
            Self::Particulate { .. } => SensorSource::Particulate,
            Self::Environmental { .. } => SensorSource::Environmental,
        }
    }

    /// Write this measurement's fields into a reading
    pub fn apply_to(&self, reading: &mut CompositeReading) {
        match *self {
            Self::Climate {
                temperature_c,
                humidity_pct,
            } => {
                reading.temperature_primary = temperature_c;
                reading.humidity = humidity_pct;
            }
            Self::Gas { ppm, .. } => {
                reading.gas_ppm = ppm;
            }
            Self::Particulate { pm2_5, pm10 } => {
                reading.pm2_5 = pm2_5;
                reading.pm10 = pm10;
            }
            Self::Environmental {
                temperature_c,
                pressure_hpa,
                altitude_m,
                gas_resistance_ohm,
            } => {
                reading.temperature_secondary = temperature_c;
                reading.pressure_hpa = pressure_hpa;
                reading.altitude_m = altitude_m;
                reading.gas_resistance_ohm = gas_resistance_ohm;
            }
        }
    }
}

/// One physical sensor
pub trait SensorAdapter {
    /// Which source this adapter reads
    fn source(&self) -> SensorSource;

    /// Perform one blocking acquisition
    fn attempt_read(&mut self) -> Result<Measurement, SensorError>;
}

impl<A: SensorAdapter + ?Sized> SensorAdapter for Box<A> {
    fn source(&self) -> SensorSource {
        (**self).source()
    }

    fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
        (**self).attempt_read()
    }
}

/// Wrap the four drivers in calibrated adapters
pub fn standard_adapters<C, A, S, E>(
    climate: C,
    analog: A,
    uart: S,
    environmental: E,
    calibration: &CalibrationConfig,
    measurement: &MeasurementConfig,
    clock: SharedClock,
) -> Vec<Box<dyn SensorAdapter>>
where
    C: ClimateDriver + 'static,
    A: AnalogDriver + 'static,
    S: ByteSource + 'static,
    E: EnvironmentalDriver + 'static,
{
    vec![
        Box::new(ClimateSensor::with_offsets(
            climate,
            calibration.temperature_offset,
            calibration.humidity_offset,
        )),
        Box::new(GasSensor::with_factor(analog, calibration.gas_factor)),
        Box::new(
            ParticulateSensor::new(uart, clock)
                .with_offset(calibration.pm_offset)
                .with_deadline(measurement.frame_deadline()),
        ),
        Box::new(EnvironmentalSensor::with_sea_level(
            environmental,
            calibration.sea_level_hpa,
        )),
    ]
}
