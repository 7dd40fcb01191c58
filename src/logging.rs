//! Subscriber setup for binaries and demos.
//!
//! The library itself only emits `tracing` events; call one of these once at
//! startup to see them.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "groundlink=info";

/// Install a stderr fmt subscriber filtered by `RUST_LOG`.
///
/// Returns false when a global subscriber was already installed.
pub fn init_from_env() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install a stderr fmt subscriber at a fixed level.
pub fn init_with_level(level: LevelFilter) -> bool {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
