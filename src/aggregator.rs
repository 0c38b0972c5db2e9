// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Reading aggregator
//!
//! The [`Aggregator`] runs every adapter once per cycle and merges the
//! results into one [`CompositeReading`]. A failing adapter never aborts the
//! cycle: its quality bit is raised and its fields keep the previous
//! cycle's value (zero on the first cycle).

use crate::clock::SharedClock;
use crate::reading::{CompositeReading, QualityMask, SensorSource};
use crate::sensors::SensorAdapter;
use log::{debug, warn};

/// Merges all sensor adapters into composite readings
pub struct Aggregator {
    adapters: Vec<Box<dyn SensorAdapter>>,
    clock: SharedClock,
    last: CompositeReading,
    cycles: u64,
}

impl Aggregator {
    /// Create an aggregator over a set of adapters.
    ///
    /// Adapters are read in [`SensorSource::ACQUISITION_ORDER`] regardless
    /// of the order given here.
    pub fn new(mut adapters: Vec<Box<dyn SensorAdapter>>, clock: SharedClock) -> Self {
        adapters.sort_by_key(|a| a.source());
        let last = CompositeReading::zeroed(clock.wall_time());
        Self {
            adapters,
            clock,
            last,
            cycles: 0,
        }
    }

    /// Sources served by this aggregator, in acquisition order
    pub fn sources(&self) -> Vec<SensorSource> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    /// Reading produced by the most recent cycle
    pub fn last_reading(&self) -> &CompositeReading {
        &self.last
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run every adapter once and merge the results
    pub fn acquire(&mut self) -> CompositeReading {
        let mut reading = self.last;
        let mut mask = QualityMask::valid();

        for adapter in &mut self.adapters {
            let source = adapter.source();
            match adapter.attempt_read() {
                Ok(measurement) => {
                    debug!("[{}] {:?}", source, measurement);
                    measurement.apply_to(&mut reading);
                }
                Err(e) => {
                    warn!("[{}] read failed: {}", source, e);
                    mask.mark_failed(source);
                }
            }
        }

        reading.quality_mask = mask;
        reading.acquired_at = self.clock.wall_time();

        self.last = reading;
        self.cycles += 1;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SensorError;
    use crate::sensors::Measurement;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Adapter replaying scripted results and recording call order
    struct Scripted {
        source: SensorSource,
        results: Vec<Result<Measurement, SensorError>>,
        log: Rc<RefCell<Vec<SensorSource>>>,
    }

    impl SensorAdapter for Scripted {
        fn source(&self) -> SensorSource {
            self.source
        }

        fn attempt_read(&mut self) -> Result<Measurement, SensorError> {
            self.log.borrow_mut().push(self.source);
            if self.results.is_empty() {
                Err(SensorError::ReadFailure("script exhausted".to_string()))
            } else {
                self.results.remove(0)
            }
        }
    }

    fn fail() -> Result<Measurement, SensorError> {
        Err(SensorError::ReadFailure("scripted".to_string()))
    }

    fn particulate(pm2_5: f32, pm10: f32) -> Result<Measurement, SensorError> {
        Ok(Measurement::Particulate { pm2_5, pm10 })
    }

    fn climate(t: f32, h: f32) -> Result<Measurement, SensorError> {
        Ok(Measurement::Climate {
            temperature_c: t,
            humidity_pct: h,
        })
    }

    #[test]
    fn test_fixed_acquisition_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let adapters: Vec<Box<dyn SensorAdapter>> = SensorSource::ACQUISITION_ORDER
            .iter()
            .rev()
            .map(|&source| {
                Box::new(Scripted {
                    source,
                    results: vec![],
                    log: log.clone(),
                }) as Box<dyn SensorAdapter>
            })
            .collect();

        let mut aggregator = Aggregator::new(adapters, ManualClock::new().shared());
        aggregator.acquire();

        assert_eq!(*log.borrow(), SensorSource::ACQUISITION_ORDER.to_vec());
    }

    #[test]
    fn test_failed_source_keeps_previous_value() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let adapters: Vec<Box<dyn SensorAdapter>> = vec![
            Box::new(Scripted {
                source: SensorSource::Particulate,
                results: vec![particulate(12.0, 20.0), fail()],
                log: log.clone(),
            }),
            Box::new(Scripted {
                source: SensorSource::Climate,
                results: vec![climate(21.0, 40.0), climate(22.0, 41.0)],
                log,
            }),
        ];
        let clock = ManualClock::starting_at(1_700_000_000).shared();
        let mut aggregator = Aggregator::new(adapters, clock.clone());

        let first = aggregator.acquire();
        assert!(first.quality_mask.is_valid());
        assert_eq!(first.pm2_5, 12.0);

        clock.advance(Duration::from_secs(900));
        let second = aggregator.acquire();
        assert_eq!(second.quality_mask.bits(), QualityMask::PARTICULATE);
        assert_eq!(second.pm2_5, 12.0);
        assert_eq!(second.pm10, 20.0);
        assert_eq!(second.temperature_primary, 22.0);
        assert_eq!(second.acquired_at.timestamp(), 1_700_000_900);
        assert_eq!(aggregator.cycles(), 2);
    }

    #[test]
    fn test_first_cycle_failure_defaults_to_zero() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let adapters: Vec<Box<dyn SensorAdapter>> = vec![Box::new(Scripted {
            source: SensorSource::Climate,
            results: vec![fail()],
            log,
        })];
        let mut aggregator = Aggregator::new(adapters, ManualClock::new().shared());

        let reading = aggregator.acquire();
        assert_eq!(reading.temperature_primary, 0.0);
        assert_eq!(reading.humidity, 0.0);
        assert!(reading.quality_mask.has_failed(SensorSource::Climate));
    }

    #[test]
    fn test_recovery_clears_bit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let adapters: Vec<Box<dyn SensorAdapter>> = vec![Box::new(Scripted {
            source: SensorSource::Particulate,
            results: vec![fail(), particulate(5.0, 6.0)],
            log,
        })];
        let mut aggregator = Aggregator::new(adapters, ManualClock::new().shared());

        assert!(!aggregator.acquire().quality_mask.is_valid());
        assert!(aggregator.acquire().quality_mask.is_valid());
    }

    /// A distinct measurement per source and cycle
    fn sample(source: SensorSource, cycle: u16) -> Measurement {
        let k = f32::from(cycle);
        match source {
            SensorSource::Climate => Measurement::Climate {
                temperature_c: 20.0 + k,
                humidity_pct: 40.0 + k,
            },
            SensorSource::Gas => Measurement::Gas {
                ppm: 100 + i32::from(cycle),
                raw: 800 + cycle,
            },
            SensorSource::Particulate => Measurement::Particulate {
                pm2_5: 10.0 + k,
                pm10: 30.0 + k,
            },
            SensorSource::Environmental => Measurement::Environmental {
                temperature_c: 21.0 + k,
                pressure_hpa: 1000.0 + k,
                altitude_m: 110.0 + k,
                gas_resistance_ohm: 48_000.0 + k,
            },
        }
    }

    /// Fields of a reading owned by one source
    fn owned_fields(reading: &CompositeReading, source: SensorSource) -> Vec<f32> {
        match source {
            SensorSource::Climate => vec![reading.temperature_primary, reading.humidity],
            SensorSource::Gas => vec![reading.gas_ppm as f32],
            SensorSource::Particulate => vec![reading.pm2_5, reading.pm10],
            SensorSource::Environmental => vec![
                reading.temperature_secondary,
                reading.pressure_hpa,
                reading.altitude_m,
                reading.gas_resistance_ohm,
            ],
        }
    }

    #[test]
    fn test_every_failure_combination() {
        let sources = SensorSource::ACQUISITION_ORDER;

        for combination in 0u8..16 {
            let failed = |i: usize| combination & (1 << i) != 0;
            let log = Rc::new(RefCell::new(Vec::new()));
            let adapters: Vec<Box<dyn SensorAdapter>> = sources
                .iter()
                .enumerate()
                .map(|(i, &source)| {
                    let second = if failed(i) {
                        fail()
                    } else {
                        Ok(sample(source, 1))
                    };
                    Box::new(Scripted {
                        source,
                        results: vec![Ok(sample(source, 0)), second],
                        log: log.clone(),
                    }) as Box<dyn SensorAdapter>
                })
                .collect();
            let mut aggregator = Aggregator::new(adapters, ManualClock::new().shared());

            let first = aggregator.acquire();
            assert!(first.quality_mask.is_valid());
            let second = aggregator.acquire();

            let expected_bits = sources
                .iter()
                .enumerate()
                .filter(|&(i, _)| failed(i))
                .fold(0u8, |bits, (_, s)| bits | s.quality_bit());
            assert_eq!(
                second.quality_mask.bits(),
                expected_bits,
                "combination {:04b}",
                combination
            );

            for (i, &source) in sources.iter().enumerate() {
                let expected = if failed(i) {
                    owned_fields(&first, source)
                } else {
                    let mut fresh = first;
                    sample(source, 1).apply_to(&mut fresh);
                    owned_fields(&fresh, source)
                };
                assert_eq!(
                    owned_fields(&second, source),
                    expected,
                    "{} in combination {:04b}",
                    source,
                    combination
                );
            }
        }
    }
}
