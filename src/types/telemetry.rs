//! Decoded telemetry records.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Battery voltage treated as empty.
pub const BATTERY_EMPTY_VOLTS: f64 = 3.0;

/// Battery voltage treated as full.
pub const BATTERY_FULL_VOLTS: f64 = 4.2;

/// Three-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl Default for GeoPosition {
    fn default() -> Self {
        Self::new(39.9334, 32.8597)
    }
}

/// The eight sensor values carried by a `$DATA` line, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// °C
    pub temperature: f64,
    /// hPa
    pub pressure: f64,
    /// m
    pub altitude: f64,
    /// m/s
    pub speed: f64,
    /// V
    pub battery_voltage: f64,
    /// °/s
    pub gyro: Axes,
}

/// One decoded telemetry frame.
///
/// Built atomically by [`TelemetryDecoder`](crate::decoder::TelemetryDecoder) and
/// never mutated afterwards; subscribers receive it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    /// Decoder-assigned packet number, starting at 1
    pub packet_number: u64,
    /// Sequence value found on the wire, advisory only
    pub wire_sequence: Option<u64>,
    /// When the line was decoded
    pub captured_at: SystemTime,
    pub readings: SensorReadings,
    /// Position from the configured position source
    pub position: Option<GeoPosition>,
    /// Accelerometer, zero when the wire format omits it
    pub accel: Axes,
}

impl TelemetryFrame {
    /// Battery charge in percent, clamped to 0..=100.
    pub fn battery_percentage(&self) -> f64 {
        battery_percentage(self.readings.battery_voltage)
    }
}

/// Linear charge estimate between [`BATTERY_EMPTY_VOLTS`] and [`BATTERY_FULL_VOLTS`].
pub fn battery_percentage(volts: f64) -> f64 {
    ((volts - BATTERY_EMPTY_VOLTS) / (BATTERY_FULL_VOLTS - BATTERY_EMPTY_VOLTS) * 100.0)
        .clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_percentage_is_clamped() {
        assert_eq!(battery_percentage(2.5), 0.0);
        assert_eq!(battery_percentage(4.5), 100.0);
        assert!((battery_percentage(3.6) - 50.0).abs() < 1e-9);
        assert!((battery_percentage(3.85) - 70.833).abs() < 0.01);
    }
}
