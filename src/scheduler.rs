//! Timed sequence execution.
//!
//! A [`SequenceScheduler`] runs at most one [`TimedSequence`] at a time against a
//! [`LinkSession`]. For each step it moves the wheel through the session (one
//! atomic, acknowledged filter change), then holds for the step duration.
//!
//! Run state follows `Idle → Running → {Completed | Cancelled | Failed} → Idle`,
//! with `Running → Cancelling` while a cancel request is pending. Cancellation is
//! observed at step boundaries and interrupts a hold; a filter change that has
//! already been written always completes first.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::sequence::{FilterStep, TimedSequence};
use crate::session::{LinkSession, Notification, lagging_aware};
use crate::types::SequenceRunState;
use crate::{LinkError, Result};

/// Progress of a running sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceEvent {
    Started { source: String, total: Duration },
    StepStarted { index: usize, step: FilterStep },
    Completed,
    /// Cancelled after `completed_steps` full or interrupted holds
    Cancelled { completed_steps: usize },
    Failed { step: usize, reason: String },
}

/// How an executed sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed,
    Cancelled { completed_steps: usize },
    Failed { step: usize, reason: String },
}

struct Inner {
    session: LinkSession,
    active: std::sync::Mutex<Option<CancellationToken>>,
    run_state: watch::Sender<SequenceRunState>,
    events: broadcast::Sender<SequenceEvent>,
}

/// Ownership of the scheduler's single run slot.
///
/// Dropping the claim frees the slot and returns the scheduler to `Idle`, even
/// when the running future is dropped or its task aborted.
struct RunClaim {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        let mut active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = None;
        self.inner.run_state.send_replace(SequenceRunState::Idle);
    }
}

/// Runs timed filter sequences against one session.
#[derive(Clone)]
pub struct SequenceScheduler {
    inner: Arc<Inner>,
}

impl SequenceScheduler {
    pub fn new(session: LinkSession) -> Self {
        let (run_state, _) = watch::channel(SequenceRunState::Idle);
        let (events, _) = broadcast::channel(session.config().event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                session,
                active: std::sync::Mutex::new(None),
                run_state,
                events,
            }),
        }
    }

    pub fn session(&self) -> &LinkSession {
        &self.inner.session
    }

    pub fn state(&self) -> SequenceRunState {
        *self.inner.run_state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Current run state, then every change a subscriber keeps up with.
    ///
    /// The terminal state (`Completed`, `Cancelled` or `Failed`) is replaced by
    /// `Idle` as soon as the run slot is released, so a subscriber that polls late
    /// sees only `Idle`. Use [`events`](Self::events) or the value returned by
    /// [`execute`](Self::execute) to learn how a run ended.
    pub fn run_states(&self) -> WatchStream<SequenceRunState> {
        WatchStream::new(self.inner.run_state.subscribe())
    }

    /// Progress events from now on.
    pub fn events(&self) -> BoxStream<'static, SequenceEvent> {
        lagging_aware(self.inner.events.subscribe(), "sequence event").boxed()
    }

    /// Parse compact notation against the session's duration cap.
    pub fn validate(&self, compact: &str) -> Result<TimedSequence> {
        TimedSequence::validate(compact, self.inner.session.config().max_sequence_duration())
    }

    /// Run `sequence` to its end on the calling task.
    ///
    /// Fails with [`LinkError::AlreadyRunning`] without touching the running
    /// sequence when one is already in progress, and with
    /// [`LinkError::InvalidSequence`] when it exceeds the configured cap.
    pub async fn execute(&self, sequence: TimedSequence) -> Result<SequenceOutcome> {
        let claim = self.claim(&sequence)?;
        Ok(self.run(sequence, claim).await)
    }

    /// Validate and execute compact notation.
    pub async fn run_compact(&self, compact: &str) -> Result<SequenceOutcome> {
        let sequence = self.validate(compact)?;
        self.execute(sequence).await
    }

    /// Run `sequence` on a new task.
    ///
    /// The run slot is claimed before this returns, so a following `execute`
    /// or `spawn` sees [`LinkError::AlreadyRunning`].
    pub fn spawn(&self, sequence: TimedSequence) -> Result<JoinHandle<SequenceOutcome>> {
        let claim = self.claim(&sequence)?;
        let scheduler = self.clone();
        Ok(tokio::spawn(async move { scheduler.run(sequence, claim).await }))
    }

    /// Request cancellation of the running sequence and return at once.
    ///
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(token) = active.as_ref() else {
            return false;
        };
        token.cancel();
        self.inner.run_state.send_if_modified(|state| {
            if *state == SequenceRunState::Running {
                *state = SequenceRunState::Cancelling;
                true
            } else {
                false
            }
        });
        info!("Sequence cancellation requested");
        true
    }

    fn claim(&self, sequence: &TimedSequence) -> Result<RunClaim> {
        sequence.check_total(self.inner.session.config().max_sequence_duration())?;
        let mut active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(LinkError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());
        self.inner.run_state.send_replace(SequenceRunState::Running);
        Ok(RunClaim { inner: Arc::clone(&self.inner), cancel })
    }

    fn emit(&self, event: SequenceEvent) {
        let _ = self.inner.events.send(event);
    }

    async fn run(&self, sequence: TimedSequence, claim: RunClaim) -> SequenceOutcome {
        let session = &self.inner.session;
        let cancel = claim.cancel.clone();
        let protocol = session.config().filter_protocol;

        info!(
            "Starting sequence {} ({} steps, {}s)",
            sequence.source(),
            sequence.len(),
            sequence.total_seconds()
        );
        self.emit(SequenceEvent::Started {
            source: sequence.source().to_string(),
            total: sequence.total_duration(),
        });

        if session.config().announce_timed_sequences {
            if let Err(e) = session.send_timed(&sequence).await {
                return self.finish_failed(&sequence, 0, e);
            }
        }

        for (index, step) in sequence.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&sequence, index);
            }

            debug!("Step {}: {} for {}s", index, step.code, step.seconds);
            self.emit(SequenceEvent::StepStarted { index, step: *step });

            let code = match step.code.for_protocol(protocol) {
                Ok(code) => code,
                Err(e) => return self.finish_failed(&sequence, index, e),
            };
            match session.change_filter_cancellable(code, &cancel).await {
                Ok(_) => {}
                Err(LinkError::Cancelled) => return self.finish_cancelled(&sequence, index),
                Err(e) => return self.finish_failed(&sequence, index, e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return self.finish_cancelled(&sequence, index + 1),
                _ = tokio::time::sleep(step.duration()) => {}
            }
        }

        info!("Sequence {} completed", sequence.source());
        self.inner.run_state.send_replace(SequenceRunState::Completed);
        self.emit(SequenceEvent::Completed);
        drop(claim);
        SequenceOutcome::Completed
    }

    fn finish_cancelled(&self, sequence: &TimedSequence, completed_steps: usize) -> SequenceOutcome {
        info!("Sequence {} cancelled after {} steps", sequence.source(), completed_steps);
        self.inner.run_state.send_replace(SequenceRunState::Cancelled);
        self.emit(SequenceEvent::Cancelled { completed_steps });
        SequenceOutcome::Cancelled { completed_steps }
    }

    fn finish_failed(&self, sequence: &TimedSequence, step: usize, err: LinkError) -> SequenceOutcome {
        let reason = err.to_string();
        error!("Sequence {} failed at step {}: {}", sequence.source(), step, reason);
        self.inner.run_state.send_replace(SequenceRunState::Failed);
        self.emit(SequenceEvent::Failed { step, reason: reason.clone() });
        self.inner.session.notify(Notification::SequenceFailed {
            sequence: sequence.source().to_string(),
            step,
            message: reason.clone(),
        });
        SequenceOutcome::Failed { step, reason }
    }
}
