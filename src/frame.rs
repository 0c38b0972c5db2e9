// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Particulate sensor frame decoder
//!
//! The particulate sensor streams fixed 32-byte frames over a UART:
//!
//! ```text
//! offset  0   1   2 .. 9    10  11   12  13   14 .. 31
//!        [42][4D][ ...... ][PM2.5 ][ PM10  ][ ....... ]
//!                           u16 BE  u16 BE
//! ```
//!
//! Concentrations are transmitted in tenths of µg/m³. The decoder owns no
//! I/O: it pulls bytes from a [`ByteSource`] until a full frame has been
//! collected or the deadline passes. A frame is all 32 bytes or nothing.

use crate::clock::Clock;
use crate::error::DecodeError;
use std::collections::VecDeque;
use std::time::Duration;

/// Total frame length, marker included
pub const FRAME_LEN: usize = 32;

/// Two-byte synchronization marker
pub const SYNC_MARKER: [u8; 2] = [0x42, 0x4D];

/// Offset of the PM2.5 field
pub const PM2_5_OFFSET: usize = 10;

/// Offset of the PM10 field
pub const PM10_OFFSET: usize = 12;

/// Default wall-clock deadline for one decode
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(5000);

/// Sleep between polls when the source has nothing buffered
pub const IDLE_POLL: Duration = Duration::from_millis(1);

/// Non-blocking byte stream
pub trait ByteSource {
    /// Next buffered byte, or `None` if nothing is available right now
    fn read_byte(&mut self) -> Option<u8>;
}

impl ByteSource for VecDeque<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

/// A complete, synchronized frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame32 {
    bytes: [u8; FRAME_LEN],
}

impl Frame32 {
    /// Wrap raw frame bytes.
    ///
    /// Returns `None` unless the buffer starts with the sync marker.
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Option<Self> {
        if bytes[..2] == SYNC_MARKER {
            Some(Self { bytes })
        } else {
            None
        }
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// Big-endian u16 at `offset`
    fn field(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// Raw PM2.5 field, tenths of µg/m³
    pub fn pm2_5_raw(&self) -> u16 {
        self.field(PM2_5_OFFSET)
    }

    /// Raw PM10 field, tenths of µg/m³
    pub fn pm10_raw(&self) -> u16 {
        self.field(PM10_OFFSET)
    }

    /// PM2.5 in µg/m³ with a calibration offset
    pub fn pm2_5(&self, offset: f32) -> f32 {
        self.pm2_5_raw() as f32 / 10.0 + offset
    }

    /// PM10 in µg/m³ with a calibration offset
    pub fn pm10(&self, offset: f32) -> f32 {
        self.pm10_raw() as f32 / 10.0 + offset
    }
}

/// Decodes frames from a byte stream under a wall-clock deadline
pub struct FrameDecoder<'c> {
    clock: &'c dyn Clock,
    deadline: Duration,
}

impl<'c> FrameDecoder<'c> {
    /// Create a decoder with the default 5 s deadline
    pub fn new(clock: &'c dyn Clock) -> Self {
        Self {
            clock,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Create a decoder with a custom deadline
    pub fn with_deadline(clock: &'c dyn Clock, deadline: Duration) -> Self {
        Self { clock, deadline }
    }

    /// Configured deadline
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Read one frame.
    ///
    /// Bytes before the marker are discarded. A byte that breaks the marker
    /// at position 1 is re-examined as a possible new position 0, so
    /// `42 42 4D` still synchronizes.
    pub fn decode<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<Frame32, DecodeError> {
        let start = self.clock.now();
        let mut buf = [0u8; FRAME_LEN];
        let mut idx = 0;

        while idx < FRAME_LEN {
            if self.clock.now().saturating_sub(start) >= self.deadline {
                return Err(DecodeError::Timeout {
                    deadline_ms: self.deadline.as_millis() as u64,
                });
            }

            let Some(byte) = source.read_byte() else {
                self.clock.sleep(IDLE_POLL);
                continue;
            };

            match idx {
                0 if byte != SYNC_MARKER[0] => continue,
                1 if byte != SYNC_MARKER[1] => {
                    idx = 0;
                    if byte == SYNC_MARKER[0] {
                        buf[0] = byte;
                        idx = 1;
                    }
                    continue;
                }
                _ => {}
            }

            buf[idx] = byte;
            idx += 1;
        }

        Ok(Frame32 { bytes: buf })
    }
}

/// Read one frame from `source` within `deadline`
pub fn decode<S: ByteSource + ?Sized>(
    source: &mut S,
    clock: &dyn Clock,
    deadline: Duration,
) -> Result<Frame32, DecodeError> {
    FrameDecoder::with_deadline(clock, deadline).decode(source)
}

/// Build a well-formed frame carrying the given raw fields
///
/// Used by simulators and tests; bytes outside the marker and the two
/// concentration fields are zero.
pub fn encode_frame(pm2_5_raw: u16, pm10_raw: u16) -> [u8; FRAME_LEN] {
    let mut bytes = [0u8; FRAME_LEN];
    bytes[..2].copy_from_slice(&SYNC_MARKER);
    bytes[PM2_5_OFFSET..PM2_5_OFFSET + 2].copy_from_slice(&pm2_5_raw.to_be_bytes());
    bytes[PM10_OFFSET..PM10_OFFSET + 2].copy_from_slice(&pm10_raw.to_be_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use approx::assert_relative_eq;

    fn stream(bytes: &[u8]) -> VecDeque<u8> {
        bytes.iter().copied().collect()
    }

    #[test]
    fn test_decode_reference_frame() {
        let mut bytes = vec![0x42, 0x4D];
        bytes.extend_from_slice(&[0x00; 8]);
        bytes.extend_from_slice(&[0x00, 0x96, 0x01, 0x2C]);
        bytes.extend_from_slice(&[0xAA; 18]);
        assert_eq!(bytes.len(), FRAME_LEN);

        let clock = ManualClock::new();
        let frame = FrameDecoder::new(&clock).decode(&mut stream(&bytes)).unwrap();

        assert_eq!(frame.pm2_5_raw(), 150);
        assert_eq!(frame.pm10_raw(), 300);
        assert_relative_eq!(frame.pm2_5(0.0), 15.0);
        assert_relative_eq!(frame.pm10(0.0), 30.0);
    }

    #[test]
    fn test_decode_applies_offset() {
        let clock = ManualClock::new();
        let mut source = stream(&encode_frame(253, 1000));
        let frame = decode(&mut source, &clock, DEFAULT_DEADLINE).unwrap();

        assert_relative_eq!(frame.pm2_5(1.5), 26.8, epsilon = 1e-4);
        assert_relative_eq!(frame.pm10(-2.0), 98.0, epsilon = 1e-4);
    }

    #[test]
    fn test_random_frames_decode_big_endian() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let clock = ManualClock::new();
        let decoder = FrameDecoder::new(&clock);

        for _ in 0..500 {
            let mut bytes = [0u8; FRAME_LEN];
            rng.fill(&mut bytes[..]);
            bytes[..2].copy_from_slice(&SYNC_MARKER);
            let offset: f32 = rng.gen_range(-5.0..5.0);

            let frame = decoder.decode(&mut stream(&bytes)).unwrap();

            let (hi, lo) = (bytes[PM2_5_OFFSET], bytes[PM2_5_OFFSET + 1]);
            let expected = ((u16::from(hi) << 8) | u16::from(lo)) as f32 / 10.0 + offset;
            assert_relative_eq!(frame.pm2_5(offset), expected, epsilon = 1e-3);

            let (hi, lo) = (bytes[PM10_OFFSET], bytes[PM10_OFFSET + 1]);
            let expected = ((u16::from(hi) << 8) | u16::from(lo)) as f32 / 10.0 + offset;
            assert_relative_eq!(frame.pm10(offset), expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_leading_garbage_discarded() {
        let mut bytes = vec![0x00, 0xFF, 0x4D, 0x13];
        bytes.extend_from_slice(&encode_frame(10, 20));

        let clock = ManualClock::new();
        let frame = FrameDecoder::new(&clock).decode(&mut stream(&bytes)).unwrap();
        assert_eq!(frame.pm2_5_raw(), 10);
        assert_eq!(frame.pm10_raw(), 20);
    }

    #[test]
    fn test_repeated_first_marker_byte_resyncs() {
        let mut bytes = vec![0x42];
        bytes.extend_from_slice(&encode_frame(77, 88));

        let clock = ManualClock::new();
        let frame = FrameDecoder::new(&clock).decode(&mut stream(&bytes)).unwrap();
        assert_eq!(frame.as_bytes()[..2], SYNC_MARKER);
        assert_eq!(frame.pm2_5_raw(), 77);
        assert_eq!(frame.pm10_raw(), 88);
    }

    #[test]
    fn test_broken_marker_restarts() {
        let mut bytes = vec![0x42, 0x00, 0x4D];
        bytes.extend_from_slice(&encode_frame(1, 2));

        let clock = ManualClock::new();
        let frame = FrameDecoder::new(&clock).decode(&mut stream(&bytes)).unwrap();
        assert_eq!(frame.pm2_5_raw(), 1);
    }

    #[test]
    fn test_empty_stream_times_out() {
        let clock = ManualClock::new();
        let result = FrameDecoder::new(&clock).decode(&mut VecDeque::<u8>::new());

        assert_eq!(result, Err(DecodeError::Timeout { deadline_ms: 5000 }));
        assert!(clock.now() >= DEFAULT_DEADLINE);
    }

    #[test]
    fn test_stalled_frame_times_out() {
        let frame = encode_frame(150, 300);
        let clock = ManualClock::new();
        let result = FrameDecoder::new(&clock).decode(&mut stream(&frame[..20]));

        assert!(matches!(result, Err(DecodeError::Timeout { .. })));
    }

    #[test]
    fn test_custom_deadline() {
        let clock = ManualClock::new();
        let decoder = FrameDecoder::with_deadline(&clock, Duration::from_millis(50));
        let result = decoder.decode(&mut VecDeque::<u8>::new());

        assert_eq!(result, Err(DecodeError::Timeout { deadline_ms: 50 }));
        assert!(clock.now() < Duration::from_millis(60));
    }

    #[test]
    fn test_frame_from_bytes_requires_marker() {
        assert!(Frame32::from_bytes(encode_frame(0, 0)).is_some());
        assert!(Frame32::from_bytes([0u8; FRAME_LEN]).is_none());
    }
}
