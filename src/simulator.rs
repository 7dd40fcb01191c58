//! Smooth telemetry model used by the simulated device.
//!
//! Altitude and speed chase slowly moving targets through a first-order lag.
//! Temperature and pressure follow altitude, and the battery drains toward a
//! floor. Disturbances are sines of elapsed time, so two models stepped the
//! same way produce identical readings.

use std::f64::consts::TAU;

use crate::types::{Axes, SensorReadings};

const ALTITUDE_TAU_SECS: f64 = 45.0;
const SPEED_TAU_SECS: f64 = 20.0;
const MAX_ALTITUDE_M: f64 = 2000.0;
const MAX_SPEED_MS: f64 = 50.0;

const SEA_LEVEL_TEMP_C: f64 = 24.0;
const LAPSE_RATE_C_PER_M: f64 = 0.0065;
const SEA_LEVEL_PRESSURE_HPA: f64 = 1013.25;
const SCALE_HEIGHT_M: f64 = 8434.0;

const BATTERY_START_VOLTS: f64 = 4.10;
const BATTERY_FLOOR_VOLTS: f64 = 3.50;
const BATTERY_DRAIN_PER_SEC: f64 = 0.02 / 3600.0;

fn wave(t: f64, period: f64, amplitude: f64) -> f64 {
    amplitude * (TAU * t / period).sin()
}

/// Telemetry physics for one simulated payload.
#[derive(Debug, Clone)]
pub struct TelemetryModel {
    elapsed: f64,
    altitude: f64,
    speed: f64,
    battery_volts: f64,
}

impl TelemetryModel {
    pub fn new() -> Self {
        Self { elapsed: 0.0, altitude: 300.0, speed: 10.0, battery_volts: BATTERY_START_VOLTS }
    }

    /// Advance by `dt` seconds and return the new readings.
    pub fn step(&mut self, dt: f64) -> SensorReadings {
        self.elapsed += dt;
        let t = self.elapsed;

        let altitude_target = 300.0 + wave(t, 600.0, 250.0) + wave(t, 90.0, 40.0);
        let speed_target = 12.0 + wave(t, 240.0, 6.0);
        self.altitude += (altitude_target - self.altitude) * (1.0 - (-dt / ALTITUDE_TAU_SECS).exp());
        self.speed += (speed_target - self.speed) * (1.0 - (-dt / SPEED_TAU_SECS).exp());
        self.altitude = (self.altitude + wave(t, 7.0, 0.8)).clamp(0.0, MAX_ALTITUDE_M);
        self.speed = (self.speed + wave(t, 5.0, 0.15)).clamp(0.0, MAX_SPEED_MS);

        self.battery_volts = (self.battery_volts - BATTERY_DRAIN_PER_SEC * dt).max(BATTERY_FLOOR_VOLTS);

        SensorReadings {
            temperature: SEA_LEVEL_TEMP_C - LAPSE_RATE_C_PER_M * self.altitude + wave(t, 11.0, 0.05),
            pressure: SEA_LEVEL_PRESSURE_HPA * (-self.altitude / SCALE_HEIGHT_M).exp() + wave(t, 13.0, 0.3),
            altitude: self.altitude,
            speed: self.speed,
            battery_voltage: self.battery_volts,
            gyro: Axes::new(wave(t, 3.0, 0.03), wave(t, 3.7, 0.03), wave(t, 4.1, 0.03)),
        }
    }
}
