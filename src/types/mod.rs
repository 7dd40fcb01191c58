//! Core types shared by every layer of the link.
//!
//! ## Architecture
//!
//! - [`FilterCode`] is a tagged variant over the two wire dialects, legacy letters
//!   ([`LegacyFilter`]) and two-digit color pairs ([`ColorPair`]). Identity is
//!   always decided on the canonical pair.
//! - [`FilterState`] is the last known wheel state as published by the session.
//! - [`TelemetryFrame`] is one decoded `$DATA` line with decoder-assigned numbering.
//! - [`LinkState`] and [`SequenceRunState`] are the lifecycle states observable
//!   through the session and the scheduler.
//!
//! ## Usage Example
//!
//! ```rust
//! use groundlink::types::{ColorPair, FilterCode, LegacyFilter};
//!
//! let purple = FilterCode::parse("P").unwrap();
//! let spectral = FilterCode::parse("13").unwrap();
//!
//! assert!(purple.same_position(spectral));
//! assert_eq!(purple.pair(), ColorPair::from_digits(1, 3).unwrap());
//! assert_eq!(LegacyFilter::Purple.servo_degrees(), 270);
//! ```

mod filter;
mod state;
mod telemetry;
mod update_rate;

pub use filter::{Color, ColorPair, FilterCode, FilterProtocol, FilterState, LegacyFilter};
pub use state::{LinkState, SequenceRunState};
pub use telemetry::{
    Axes, BATTERY_EMPTY_VOLTS, BATTERY_FULL_VOLTS, GeoPosition, SensorReadings, TelemetryFrame,
    battery_percentage,
};
pub use update_rate::UpdateRate;
