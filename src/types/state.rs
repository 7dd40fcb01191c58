//! Lifecycle states published by the session and the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a [`LinkSession`](crate::session::LinkSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The transport failed; the session stays faulted until the next connect or disconnect
    Faulted,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Faulted => "faulted",
        };
        f.write_str(text)
    }
}

/// Run state of a [`SequenceScheduler`](crate::scheduler::SequenceScheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequenceRunState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl SequenceRunState {
    /// A sequence currently owns the scheduler.
    pub fn is_active(self) -> bool {
        matches!(self, SequenceRunState::Running | SequenceRunState::Cancelling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SequenceRunState::Completed | SequenceRunState::Cancelled | SequenceRunState::Failed
        )
    }
}
