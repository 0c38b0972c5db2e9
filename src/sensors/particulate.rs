// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Particulate sensor adapter
//!
//! Pulls one frame per read through the [`FrameDecoder`], applies the
//! calibration offset and rounds to one decimal.

use super::{Measurement, SensorAdapter};
use crate::clock::SharedClock;
use crate::error::SensorError;
use crate::frame::{ByteSource, FrameDecoder, DEFAULT_DEADLINE};
use crate::reading::{round_to, SensorSource};
use std::time::Duration;

/// UART particulate sensor
pub struct ParticulateSensor<S> {
    source: S,
    clock: SharedClock,
    deadline: Duration,
    offset: f32,
}

impl<S: ByteSource> ParticulateSensor<S> {
    /// Create an adapter with the default deadline and no offset
    pub fn new(source: S, clock: SharedClock) -> Self {
        Self {
            source,
            clock,
            deadline: DEFAULT_DEADLINE,
            offset: 0.0,
        }
    }

    /// Set the calibration offset (µg/m³)
    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }

    /// Set the frame deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Access the byte source
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: ByteSource> SensorAdapter for ParticulateSensor<S> {
    fn source(&self) -> SensorSource {
        SensorSource::Particulate
    }

    fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
        let decoder = FrameDecoder::with_deadline(&*self.clock, self.deadline);
        let frame = decoder.decode(&mut self.source)?;

        Ok(Measurement::Particulate {
            pm2_5: round_to(frame.pm2_5(self.offset), 1),
            pm10: round_to(frame.pm10(self.offset), 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::DecodeError;
    use crate::frame::encode_frame;
    use std::collections::VecDeque;

    #[test]
    fn test_read_frame() {
        let clock = ManualClock::new().shared();
        let bytes: VecDeque<u8> = encode_frame(150, 300).into_iter().collect();
        let mut sensor = ParticulateSensor::new(bytes, clock);

        assert_eq!(
            sensor.attempt_read().unwrap(),
            Measurement::Particulate {
                pm2_5: 15.0,
                pm10: 30.0
            }
        );
    }

    #[test]
    fn test_offset_then_rounding() {
        let clock = ManualClock::new().shared();
        let bytes: VecDeque<u8> = encode_frame(123, 456).into_iter().collect();
        let mut sensor = ParticulateSensor::new(bytes, clock).with_offset(0.04);

        // 12.3 + 0.04 = 12.34 -> 12.3, 45.6 + 0.04 = 45.64 -> 45.6
        assert_eq!(
            sensor.attempt_read().unwrap(),
            Measurement::Particulate {
                pm2_5: 12.3,
                pm10: 45.6
            }
        );
    }

    #[test]
    fn test_timeout_is_sensor_error() {
        let clock = ManualClock::new().shared();
        let mut sensor = ParticulateSensor::new(VecDeque::<u8>::new(), clock.clone())
            .with_deadline(Duration::from_millis(20));

        assert_eq!(
            sensor.attempt_read(),
            Err(SensorError::Decode(DecodeError::Timeout { deadline_ms: 20 }))
        );
    }
}
