//! Automatic filter cycling.
//!
//! While running, the cycler steps the wheel through [`AUTO_CYCLE_PATTERN`] once
//! per interval, first change one interval after start. The position in the
//! pattern belongs to the cycler, so a stop and restart continues where it left
//! off.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{LinkSession, Notification};
use crate::types::{ColorPair, FilterCode};
use crate::{LinkError, Result};

/// Color pairs visited in auto mode, in order.
pub const AUTO_CYCLE_PATTERN: [(u8, u8); 6] = [(0, 0), (1, 0), (2, 0), (3, 0), (1, 3), (0, 0)];

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Cycles one session's filter wheel on a timer.
pub struct AutoCycler {
    session: LinkSession,
    next_index: Arc<AtomicUsize>,
    running: std::sync::Mutex<Option<Running>>,
}

impl AutoCycler {
    pub fn new(session: LinkSession) -> Self {
        Self { session, next_index: Arc::new(AtomicUsize::new(0)), running: std::sync::Mutex::new(None) }
    }

    /// Start with the configured interval.
    pub fn start(&self) -> Result<()> {
        self.start_with_interval(self.session.config().auto_cycle.interval())
    }

    /// Start, or restart with a new interval.
    pub fn start_with_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(LinkError::config("auto-cycle interval must be greater than zero"));
        }

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = running.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(cycle(
            self.session.clone(),
            Arc::clone(&self.next_index),
            interval,
            cancel.clone(),
        ));
        info!("Auto-cycle started every {:?}", interval);
        *running = Some(Running { cancel, task });
        Ok(())
    }

    /// Stop cycling. Returns false when it was not running.
    pub fn stop(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.take() {
            Some(previous) => {
                previous.cancel.cancel();
                info!("Auto-cycle stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Index into [`AUTO_CYCLE_PATTERN`] of the next change.
    pub fn next_index(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }
}

impl Drop for AutoCycler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn cycle(
    session: LinkSession,
    next_index: Arc<AtomicUsize>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let index = next_index.load(Ordering::SeqCst) % AUTO_CYCLE_PATTERN.len();
        next_index.store((index + 1) % AUTO_CYCLE_PATTERN.len(), Ordering::SeqCst);

        let (a, b) = AUTO_CYCLE_PATTERN[index];
        let code = ColorPair::from_digits(a, b).map(FilterCode::Spectral);
        let result = match code {
            Ok(code) => session.change_filter_cancellable(code, &cancel).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(change) => debug!("Auto-cycle step {} -> {}", index, change.state.code),
            Err(LinkError::Cancelled) => break,
            Err(e) => {
                warn!("Auto-cycle step {} failed: {}", index, e);
                session.notify(Notification::AutoCycleError { message: e.to_string() });
            }
        }
    }
}
