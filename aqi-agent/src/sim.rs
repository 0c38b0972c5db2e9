// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated sensor drivers
//!
//! Stand-ins for the hardware drivers so the agent runs on any host. Each
//! driver fails with a configurable probability; the particulate stream
//! mixes valid frames with line noise, false sync starts, and stalls.

use aqi_station::frame::{encode_frame, SYNC_MARKER};
use aqi_station::sensors::{AnalogDriver, ClimateDriver, EnvironmentalDriver, EnvironmentalSample};
use aqi_station::ByteSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Silent polls after a stall; outlasts the 5 s frame deadline at 1 ms per poll
const STALL_POLLS: u32 = 6000;

/// UART byte stream from a simulated particulate sensor
pub struct SimulatedUart {
    rng: StdRng,
    buffer: VecDeque<u8>,
    stall_rate: f64,
    silent_polls: u32,
}

impl SimulatedUart {
    /// `stall_rate` is the chance that a frame is cut short and the line goes quiet
    pub fn new(seed: Option<u64>, stall_rate: f64) -> Self {
        Self {
            rng: rng_from(seed),
            buffer: VecDeque::new(),
            stall_rate: stall_rate.clamp(0.0, 1.0),
            silent_polls: 0,
        }
    }

    fn refill(&mut self) {
        let pm2_5: u16 = self.rng.gen_range(20..600);
        let pm10 = pm2_5 + self.rng.gen_range(0..400u16);
        let frame = encode_frame(pm2_5, pm10);

        if self.rng.gen_bool(self.stall_rate) {
            // Part of a frame, then nothing
            let cut = self.rng.gen_range(2..frame.len());
            self.buffer.extend(&frame[..cut]);
            self.silent_polls = STALL_POLLS;
            return;
        }

        let noise = self.rng.gen_range(0..8);
        for _ in 0..noise {
            let byte: u8 = self.rng.gen();
            self.buffer.push_back(if byte == SYNC_MARKER[0] { 0x00 } else { byte });
        }
        if self.rng.gen_bool(0.2) {
            self.buffer.push_back(SYNC_MARKER[0]);
        }
        self.buffer.extend(frame);
    }
}

impl ByteSource for SimulatedUart {
    fn read_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.buffer.pop_front() {
            return Some(byte);
        }
        if self.silent_polls > 0 {
            self.silent_polls -= 1;
            return None;
        }
        self.refill();
        self.buffer.pop_front()
    }
}

/// Simulated temperature/humidity driver
pub struct SimulatedClimate {
    rng: StdRng,
    failure_rate: f64,
}

impl SimulatedClimate {
    /// Seeded driver failing with `failure_rate` probability
    pub fn new(seed: Option<u64>, failure_rate: f64) -> Self {
        Self {
            rng: rng_from(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl ClimateDriver for SimulatedClimate {
    fn read_temperature(&mut self) -> f32 {
        if self.rng.gen_bool(self.failure_rate) {
            return f32::NAN;
        }
        self.rng.gen_range(18.0..30.0)
    }

    fn read_humidity(&mut self) -> f32 {
        self.rng.gen_range(30.0..70.0)
    }
}

/// Simulated 12-bit analog gas input
pub struct SimulatedAnalog {
    rng: StdRng,
    failure_rate: f64,
}

impl SimulatedAnalog {
    /// Seeded driver failing with `failure_rate` probability
    pub fn new(seed: Option<u64>, failure_rate: f64) -> Self {
        Self {
            rng: rng_from(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl AnalogDriver for SimulatedAnalog {
    fn read_raw(&mut self) -> Option<u16> {
        if self.rng.gen_bool(self.failure_rate) {
            return None;
        }
        Some(self.rng.gen_range(200..1800))
    }
}

/// Simulated environmental multi-sensor
pub struct SimulatedEnvironmental {
    rng: StdRng,
    failure_rate: f64,
}

impl SimulatedEnvironmental {
    /// Seeded driver failing with `failure_rate` probability
    pub fn new(seed: Option<u64>, failure_rate: f64) -> Self {
        Self {
            rng: rng_from(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl EnvironmentalDriver for SimulatedEnvironmental {
    fn perform_reading(&mut self) -> Option<EnvironmentalSample> {
        if self.rng.gen_bool(self.failure_rate) {
            return None;
        }
        Some(EnvironmentalSample {
            temperature_c: self.rng.gen_range(18.0..30.0),
            pressure_pa: self.rng.gen_range(99_000.0..102_500.0),
            gas_resistance_ohm: self.rng.gen_range(5_000.0..120_000.0),
        })
    }
}
