//! A connected ground station: one session with its scheduler and auto-cycler.

use tracing::info;

use crate::auto_cycle::AutoCycler;
use crate::scheduler::SequenceScheduler;
use crate::session::LinkSession;

/// Everything that drives one link, wired together.
pub struct GroundStation {
    session: LinkSession,
    scheduler: SequenceScheduler,
    auto_cycle: AutoCycler,
}

impl GroundStation {
    /// Wire a scheduler and an auto-cycler to `session`. Does not connect.
    pub fn new(session: LinkSession) -> Self {
        Self {
            scheduler: SequenceScheduler::new(session.clone()),
            auto_cycle: AutoCycler::new(session.clone()),
            session,
        }
    }

    pub fn session(&self) -> &LinkSession {
        &self.session
    }

    pub fn scheduler(&self) -> &SequenceScheduler {
        &self.scheduler
    }

    pub fn auto_cycle(&self) -> &AutoCycler {
        &self.auto_cycle
    }

    /// Stop cycling, cancel any sequence, then close the link.
    pub async fn shutdown(&self) {
        self.auto_cycle.stop();
        self.scheduler.cancel();
        self.session.disconnect().await;
        info!("Ground station shut down");
    }
}
