//! Ground-station link layer for a satellite payload.
//!
//! Groundlink talks to an embedded payload over a byte-oriented link: it frames
//! the incoming byte stream into lines, decodes `$DATA` telemetry, drives the
//! multi-position filter wheel with acknowledged commands, and runs timed filter
//! sequences with cooperative cancellation.
//!
//! # Features
//!
//! - **Line framing**: `\r`/`\n` delimited lines reconstructed across arbitrary read boundaries
//! - **Telemetry decoding**: typed frames with decoder-owned packet numbering
//! - **Filter control**: legacy `$FILTER` and two-digit `SPECTRAL` dialects over one canonical color pair
//! - **Timed sequences**: compact `3g5r2b1n` notation, one running sequence per session
//! - **Pluggable transports**: anything that opens into async read/write halves
//!
//! ## Example (simulated payload)
//!
//! ```rust,no_run
//! use groundlink::{GroundLink, LinkConfig, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> groundlink::Result<()> {
//!     let station = GroundLink::simulate(LinkConfig::default()).await?;
//!     let mut frames = station.session().telemetry(UpdateRate::Max(2));
//!
//!     station.session().select_purple().await?;
//!     station.scheduler().run_compact("3g5r2b1n").await?;
//!
//!     if let Some(frame) = frames.next().await {
//!         println!("Altitude: {:.1} m", frame.readings.altitude);
//!     }
//!     station.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire formats
pub mod codec;
pub mod decoder;
pub mod framer;
pub mod sequence;

// Link plumbing
pub mod config;
pub mod driver;
pub mod logging;
pub mod session;
pub mod stream;
pub mod transport;
pub mod transports;

// Control
pub mod auto_cycle;
pub mod scheduler;
pub mod simulator;
pub mod station;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use auto_cycle::AutoCycler;
pub use config::LinkConfig;
pub use decoder::{PositionSource, Rejection, TelemetryDecoder};
pub use framer::{FramedLine, LineFramer};
pub use scheduler::{SequenceEvent, SequenceOutcome, SequenceScheduler};
pub use sequence::{FilterStep, SequenceRejection, TimedSequence};
pub use session::{FilterChange, LinkSession, Notification};
pub use station::GroundStation;
pub use transport::{LinkIo, PortSettings, Transport};
pub use transports::{MemoryTransport, SimulatedDevice, SimulatorSettings};

/// Entry point for connected ground stations.
///
/// # Examples
///
/// ```rust,no_run
/// use groundlink::{GroundLink, LinkConfig, SimulatedDevice};
///
/// #[tokio::main]
/// async fn main() -> groundlink::Result<()> {
///     let config = LinkConfig::load("groundlink.yaml")?;
///     let station = GroundLink::connect(SimulatedDevice::default(), config).await?;
///     station.session().start_telemetry().await?;
///     Ok(())
/// }
/// ```
pub struct GroundLink;

impl GroundLink {
    /// Validate `config`, open the link over `transport`, and wire a station to it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The transport refuses to open
    pub async fn connect<T: Transport>(transport: T, config: LinkConfig) -> Result<GroundStation> {
        config.validate()?;
        let station = GroundStation::new(LinkSession::new(transport, config));
        station.session().connect().await?;
        Ok(station)
    }

    /// Connect to a [`SimulatedDevice`] with default behaviour.
    pub async fn simulate(config: LinkConfig) -> Result<GroundStation> {
        Self::connect(SimulatedDevice::default(), config).await
    }
}
