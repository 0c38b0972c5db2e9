// AQI Station - Air-quality telemetry station
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Secondary exporter hook
//!
//! Runs after the publisher each cycle when enabled. The shipped
//! [`LineProtocolExporter`] renders a time-series line-protocol record and
//! logs it; it has no transport.

use crate::config::ExporterConfig;
use crate::error::ExportError;
use crate::reading::CompositeReading;
use log::debug;

/// Destination for readings besides the broker
pub trait SecondaryExporter {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Export one reading
    fn export(&mut self, station_id: &str, reading: &CompositeReading) -> Result<(), ExportError>;
}

impl<E: SecondaryExporter + ?Sized> SecondaryExporter for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn export(&mut self, station_id: &str, reading: &CompositeReading) -> Result<(), ExportError> {
        (**self).export(station_id, reading)
    }
}

/// Renders line-protocol records
#[derive(Debug, Clone)]
pub struct LineProtocolExporter {
    config: ExporterConfig,
    last_line: Option<String>,
    exported: u64,
}

impl LineProtocolExporter {
    /// Create an exporter from its configuration
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            last_line: None,
            exported: 0,
        }
    }

    /// Most recently rendered record
    pub fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }

    /// Records rendered so far
    pub fn exported(&self) -> u64 {
        self.exported
    }

    /// Render one record: `measurement,station=<id> field=value,... <ns>`
    pub fn render(&self, station_id: &str, reading: &CompositeReading) -> Result<String, ExportError> {
        if self.config.measurement.is_empty() {
            return Err(ExportError::InvalidRecord("empty measurement name".to_string()));
        }

        let floats = [
            ("pm25", reading.pm2_5),
            ("pm10", reading.pm10),
            ("temperature", reading.temperature_primary),
            ("humidity", reading.humidity),
            ("temperature_bme", reading.temperature_secondary),
            ("pressure", reading.pressure_hpa),
            ("altitude", reading.altitude_m),
            ("gas_resistance", reading.gas_resistance_ohm),
        ];

        let mut fields = Vec::with_capacity(floats.len() + 2);
        for (key, value) in floats {
            if !value.is_finite() {
                return Err(ExportError::InvalidRecord(format!("{} is {}", key, value)));
            }
            fields.push(format!("{}={}", key, value));
        }
        fields.push(format!("ppm={}i", reading.gas_ppm));
        fields.push(format!("quality={}i", reading.quality_mask.bits()));

        let nanos = reading
            .acquired_at
            .timestamp_nanos_opt()
            .ok_or_else(|| ExportError::InvalidRecord("timestamp out of range".to_string()))?;

        Ok(format!(
            "{},station={} {} {}",
            escape(&self.config.measurement),
            escape(station_id),
            fields.join(","),
            nanos
        ))
    }
}

impl SecondaryExporter for LineProtocolExporter {
    fn name(&self) -> &str {
        "line-protocol"
    }

    fn export(&mut self, station_id: &str, reading: &CompositeReading) -> Result<(), ExportError> {
        if !self.config.enabled {
            return Err(ExportError::Disabled);
        }
        let line = self.render(station_id, reading)?;
        debug!(
            "[export] {}:{}/{} {}",
            self.config.host, self.config.port, self.config.database, line
        );
        self.last_line = Some(line);
        self.exported += 1;
        Ok(())
    }
}

/// Escape commas, spaces and equals signs in names and tag values
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
