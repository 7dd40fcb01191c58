//! Delivery rate for telemetry subscriptions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery rate for a telemetry subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every decoded frame, as fast as the device sends them
    #[default]
    Native,

    /// At most this many frames per second, latest frame wins
    Max(u32),
}

impl UpdateRate {
    /// Sampling period, or `None` when every frame is delivered.
    ///
    /// `Max(0)` is treated as `Native`.
    pub fn period(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }

    /// Check if sampling is needed
    pub fn needs_sampling(self) -> bool {
        self.period().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods() {
        assert_eq!(UpdateRate::Native.period(), None);
        assert_eq!(UpdateRate::Max(0).period(), None);
        assert_eq!(UpdateRate::Max(4).period(), Some(Duration::from_millis(250)));
        assert!(UpdateRate::Max(10).needs_sampling());
    }
}
