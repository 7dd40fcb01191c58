//! Telemetry line decoding.
//!
//! Wire format (one line, header case-insensitive):
//!
//! ```text
//! $DATA,<seq>,<temp>,<pressure>,<altitude>,<speed>,<voltage>,<gyroX>,<gyroY>,<gyroZ>
//! ```
//!
//! A bad numeric field never sinks the frame: it decodes as `0.0` and the rest of
//! the line is still used. Structural problems (wrong header, too few fields)
//! reject the line with a [`Rejection`] that says why.

use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{trace, warn};

use crate::types::{Axes, GeoPosition, SensorReadings, TelemetryFrame};

/// Header that starts every telemetry line.
pub const DATA_HEADER: &str = "$DATA,";

/// Fields required after the header: sequence token plus eight sensor values.
pub const DATA_FIELD_COUNT: usize = 9;

/// Why a line did not produce a telemetry frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Blank line or comment; not worth reporting.
    #[error("blank or comment line")]
    Ignorable,

    #[error("unrecognized header in '{preview}'")]
    UnknownHeader { preview: String },

    #[error("expected at least {expected} fields, found {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },
}

impl Rejection {
    /// Rejections that should not surface as diagnostics.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Rejection::Ignorable)
    }
}

/// Supplies a position for frames whose wire format carries no GPS fields.
pub trait PositionSource: Send + Sync + 'static {
    fn current_position(&self) -> Option<GeoPosition>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPosition(pub GeoPosition);

impl PositionSource for FixedPosition {
    fn current_position(&self) -> Option<GeoPosition> {
        Some(self.0)
    }
}

/// Parse one numeric field with a `.` decimal point, retrying with `,` read as `.`.
pub fn parse_field(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().or_else(|| trimmed.replace(',', ".").parse::<f64>().ok())
}

/// Render readings as a `$DATA` line, the format the device firmware emits.
pub fn encode_data_line(wire_sequence: u64, readings: &SensorReadings) -> String {
    format!(
        "$DATA,{},{:.1},{:.1},{:.1},{:.1},{:.2},{:.1},{:.1},{:.1}",
        wire_sequence,
        readings.temperature,
        readings.pressure,
        readings.altitude,
        readings.speed,
        readings.battery_voltage,
        readings.gyro.x,
        readings.gyro.y,
        readings.gyro.z,
    )
}

/// Stateful `$DATA` decoder.
///
/// Packet numbers come from the decoder's own counter, so two sessions in one
/// process never share numbering.
pub struct TelemetryDecoder {
    packet_counter: u64,
    position: Arc<dyn PositionSource>,
}

impl Default for TelemetryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self::with_position_source(Arc::new(FixedPosition::default()))
    }

    pub fn with_position_source(position: Arc<dyn PositionSource>) -> Self {
        Self { packet_counter: 0, position }
    }

    /// Number of frames decoded so far.
    pub fn packets_decoded(&self) -> u64 {
        self.packet_counter
    }

    /// Decode one framed line.
    pub fn decode(&mut self, line: &str) -> Result<TelemetryFrame, Rejection> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            return Err(Rejection::Ignorable);
        }

        let has_header =
            line.get(..DATA_HEADER.len()).is_some_and(|h| h.eq_ignore_ascii_case(DATA_HEADER));
        if !has_header {
            return Err(Rejection::UnknownHeader { preview: line.chars().take(16).collect() });
        }

        let fields: Vec<&str> = line[DATA_HEADER.len()..].split(',').collect();
        if fields.len() < DATA_FIELD_COUNT {
            return Err(Rejection::FieldCountMismatch {
                expected: DATA_FIELD_COUNT,
                actual: fields.len(),
            });
        }

        let value = |index: usize| -> f64 {
            parse_field(fields[index]).unwrap_or_else(|| {
                warn!(field = index, raw = fields[index], "Unparseable telemetry field, using 0.0");
                0.0
            })
        };

        let readings = SensorReadings {
            temperature: value(1),
            pressure: value(2),
            altitude: value(3),
            speed: value(4),
            battery_voltage: value(5),
            gyro: Axes::new(value(6), value(7), value(8)),
        };

        self.packet_counter += 1;
        let frame = TelemetryFrame {
            packet_number: self.packet_counter,
            wire_sequence: fields[0].trim().parse().ok(),
            captured_at: SystemTime::now(),
            readings,
            position: self.position.current_position(),
            accel: Axes::default(),
        };

        trace!(
            packet = frame.packet_number,
            temperature = readings.temperature,
            altitude = readings.altitude,
            "Decoded telemetry frame"
        );
        Ok(frame)
    }
}
