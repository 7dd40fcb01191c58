//! Link session: connection lifecycle, write serialization and event fan-out.
//!
//! A [`LinkSession`] is the only owner of the transport halves. It spawns the
//! reader task through the [`Driver`], serializes every outbound line behind a
//! single lock, and publishes what it learns on explicit channels:
//!
//! | Channel | Kind | Contents |
//! |---------|------|----------|
//! | [`link_states`](LinkSession::link_states) | watch | [`LinkState`] |
//! | [`filter_updates`](LinkSession::filter_updates) | watch | [`FilterState`] |
//! | [`telemetry`](LinkSession::telemetry) | broadcast | `Arc<TelemetryFrame>` |
//! | [`notifications`](LinkSession::notifications) | broadcast | [`Notification`] |
//!
//! Watch channels always hold the latest value, so late subscribers see the
//! current state at once. Broadcast channels do not replay; a subscriber that
//! falls more than `event_capacity` items behind skips ahead and the gap is
//! logged.
//!
//! ## Filter changes
//!
//! [`change_filter`](LinkSession::change_filter) writes one command and waits for
//! the device to report the target position, bounded by `ack_timeout_ms`. When no
//! acknowledgement arrives in time the session assumes the move completed,
//! records the target as the current filter and emits
//! [`Notification::AckTimeout`]. If the link drops during the wait the change
//! fails with [`LinkError::NotConnected`] instead. Only one filter change is in flight per
//! session; cancellation is honored until the command is written, never during
//! the motion itself.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{self, RELEASE, START_TELEMETRY};
use crate::config::LinkConfig;
use crate::decoder::{FixedPosition, PositionSource, Rejection, TelemetryDecoder};
use crate::driver::Driver;
use crate::sequence::TimedSequence;
use crate::stream::SampleExt;
use crate::transport::{LinkWriter, PortSettings, Transport};
use crate::types::{
    ColorPair, FilterCode, FilterState, LegacyFilter, LinkState, TelemetryFrame, UpdateRate,
};
use crate::{LinkError, Result};

/// Diagnostic and lifecycle events published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ConnectionChanged { state: LinkState },
    /// A line that was not filter traffic failed to decode
    FrameRejected { line: String, rejection: Rejection },
    /// A line with a filter prefix carried an unusable payload
    MalformedFilterMessage { line: String, reason: String },
    /// An inbound line outgrew `max_line_len` and was dropped
    LineTooLong { discarded: usize },
    CommandSent { command: String },
    /// No acknowledgement arrived; the target was assumed reached
    AckTimeout { command: String, timeout: Duration },
    TransportError { message: String },
    SequenceFailed { sequence: String, step: usize, message: String },
    AutoCycleError { message: String },
}

/// Outcome of a single filter change.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChange {
    /// Filter state after the change settled
    pub state: FilterState,
    /// The device acknowledged the target; false when the timeout fallback applied
    pub confirmed: bool,
}

/// Channels and per-session counters shared with the reader task.
pub(crate) struct Hub {
    pub(crate) link_state: watch::Sender<LinkState>,
    pub(crate) filter: watch::Sender<FilterState>,
    pub(crate) telemetry: broadcast::Sender<Arc<TelemetryFrame>>,
    pub(crate) notifications: broadcast::Sender<Notification>,
    pub(crate) max_line_len: usize,
    decoder: std::sync::Mutex<TelemetryDecoder>,
    generation: AtomicU64,
}

impl Hub {
    pub(crate) fn new(config: &LinkConfig, position: Option<Arc<dyn PositionSource>>) -> Self {
        let position =
            position.unwrap_or_else(|| Arc::new(FixedPosition(config.default_position)));
        let (link_state, _) = watch::channel(LinkState::Disconnected);
        let (filter, _) = watch::channel(FilterState::default());
        let capacity = config.event_capacity.max(1);
        let (telemetry, _) = broadcast::channel(capacity);
        let (notifications, _) = broadcast::channel(capacity);

        Self {
            link_state,
            filter,
            telemetry,
            notifications,
            max_line_len: config.max_line_len,
            decoder: std::sync::Mutex::new(TelemetryDecoder::with_position_source(position)),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    /// Publish a new link state; unchanged states are not re-announced.
    pub(crate) fn set_link_state(&self, state: LinkState) {
        let previous = self.link_state.send_replace(state);
        if previous != state {
            info!("Link {} -> {}", previous, state);
            self.notify(Notification::ConnectionChanged { state });
        }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        // Nobody listening is fine
        let _ = self.notifications.send(notification);
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Fault the link opened as `generation`, unless a newer link replaced it.
    pub(crate) fn fault(&self, generation: u64, message: String) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Ignoring fault from stale link generation {}", generation);
            return;
        }
        if self.link_state() != LinkState::Connected {
            return;
        }
        error!("Link faulted: {}", message);
        self.set_link_state(LinkState::Faulted);
        self.notify(Notification::TransportError { message });
    }

    pub(crate) fn decode(&self, line: &str) -> std::result::Result<TelemetryFrame, Rejection> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner).decode(line)
    }

    pub(crate) fn packets_decoded(&self) -> u64 {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner).packets_decoded()
    }
}

struct ActiveLink {
    writer: LinkWriter,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    generation: u64,
    settings: PortSettings,
}

struct Shared {
    hub: Arc<Hub>,
    transport: Arc<dyn Transport>,
    config: LinkConfig,
    link: Mutex<Option<ActiveLink>>,
    /// Held for the whole write-and-acknowledge cycle of a filter change
    motion: Mutex<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(active) = self.link.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

/// Handle to one ground-station link.
///
/// Cloning is cheap; all clones drive the same link.
#[derive(Clone)]
pub struct LinkSession {
    shared: Arc<Shared>,
}

impl LinkSession {
    pub fn new<T: Transport>(transport: T, config: LinkConfig) -> Self {
        Self::with_transport(Arc::new(transport), config, None)
    }

    /// Build a session over a shared transport, optionally with a custom position source.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        config: LinkConfig,
        position: Option<Arc<dyn PositionSource>>,
    ) -> Self {
        let hub = Arc::new(Hub::new(&config, position));
        Self {
            shared: Arc::new(Shared {
                hub,
                transport,
                config,
                link: Mutex::new(None),
                motion: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn transport_name(&self) -> &str {
        self.shared.transport.name()
    }

    pub fn state(&self) -> LinkState {
        self.shared.hub.link_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn filter_state(&self) -> FilterState {
        self.shared.hub.filter.borrow().clone()
    }

    /// Frames decoded over the session's lifetime, across reconnects.
    pub fn packets_decoded(&self) -> u64 {
        self.shared.hub.packets_decoded()
    }

    /// Connect with the configured port settings.
    pub async fn connect(&self) -> Result<()> {
        self.connect_to(self.shared.config.port_settings()).await
    }

    /// Connect to `settings`, tearing down any existing link first.
    pub async fn connect_to(&self, settings: PortSettings) -> Result<()> {
        let hub = &self.shared.hub;
        let mut link = self.shared.link.lock().await;

        if let Some(active) = link.take() {
            info!("Reconnecting: closing link to {}", active.settings);
            Self::teardown(active).await;
            hub.set_link_state(LinkState::Disconnected);
        }

        hub.set_link_state(LinkState::Connecting);
        info!("Opening {} link to {}", self.shared.transport.name(), settings);

        match self.shared.transport.open(&settings).await {
            Ok(io) => {
                let generation = hub.next_generation();
                let cancel = CancellationToken::new();
                hub.set_link_state(LinkState::Connected);
                let reader = Driver::spawn(io.reader, Arc::clone(hub), generation, cancel.clone());
                *link = Some(ActiveLink { writer: io.writer, cancel, reader, generation, settings });
                Ok(())
            }
            Err(e) => {
                error!("Failed to open {}: {}", settings, e);
                hub.set_link_state(LinkState::Faulted);
                hub.notify(Notification::TransportError { message: e.to_string() });
                Err(e)
            }
        }
    }

    /// Close the link. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let hub = &self.shared.hub;
        let mut link = self.shared.link.lock().await;

        if let Some(active) = link.take() {
            info!("Closing link to {}", active.settings);
            Self::teardown(active).await;
        }
        hub.set_link_state(LinkState::Disconnected);
    }

    async fn teardown(mut active: ActiveLink) {
        active.cancel.cancel();
        if let Err(e) = active.writer.shutdown().await {
            debug!("Writer shutdown failed: {}", e);
        }
        drop(active.writer);
        if let Err(e) = active.reader.await {
            warn!("Line reader task failed: {}", e);
        }
    }

    /// Write one command line, `\n` terminated.
    pub async fn write_line(&self, command: &str) -> Result<()> {
        self.write_line_inner(command, None).await
    }

    async fn write_line_inner(&self, command: &str, cancel: Option<&CancellationToken>) -> Result<()> {
        let hub = &self.shared.hub;
        let mut link = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LinkError::Cancelled),
                link = self.shared.link.lock() => link,
            },
            None => self.shared.link.lock().await,
        };

        let active = match link.as_mut() {
            Some(active) if hub.link_state().is_connected() => active,
            _ => return Err(LinkError::NotConnected),
        };

        let timeout = self.shared.config.write_timeout();
        let framed = format!("{command}\n");
        let write = async {
            active.writer.write_all(framed.as_bytes()).await?;
            active.writer.flush().await
        };

        let failure = match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => {
                debug!("Sent {}", command);
                hub.notify(Notification::CommandSent { command: command.to_string() });
                return Ok(());
            }
            Ok(Err(e)) => LinkError::io_error(format!("writing '{command}'"), e),
            Err(_) => LinkError::timeout(format!("writing '{command}'"), timeout),
        };

        active.cancel.cancel();
        hub.fault(active.generation, failure.to_string());
        Err(failure)
    }

    /// Send an operator-typed command verbatim.
    pub async fn send_raw(&self, command: &str) -> Result<()> {
        let command = command.trim();
        if command.is_empty() {
            return Err(LinkError::invalid_command("command is empty"));
        }
        if command.contains(['\r', '\n']) {
            return Err(LinkError::invalid_command("command spans more than one line"));
        }
        self.write_line(command).await
    }

    pub async fn start_telemetry(&self) -> Result<()> {
        self.write_line(START_TELEMETRY).await
    }

    pub async fn release(&self) -> Result<()> {
        self.write_line(RELEASE).await
    }

    /// Announce a timed sequence to the device as `$TIMED_FILTER,<compact>`.
    ///
    /// Sequences over `max_sequence_seconds` are rejected before anything is written.
    pub async fn send_timed(&self, sequence: &TimedSequence) -> Result<()> {
        sequence.check_total(self.shared.config.max_sequence_duration())?;
        self.write_line(&codec::encode_timed(sequence)).await
    }

    /// Move the wheel to `code`, sent in its own dialect.
    pub async fn change_filter(&self, code: FilterCode) -> Result<FilterChange> {
        self.change_filter_cancellable(code, &CancellationToken::new()).await
    }

    /// Like [`change_filter`](Self::change_filter), abandoned if `cancel` fires
    /// before the command is written.
    pub async fn change_filter_cancellable(
        &self,
        code: FilterCode,
        cancel: &CancellationToken,
    ) -> Result<FilterChange> {
        let hub = &self.shared.hub;
        let _motion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LinkError::Cancelled),
            guard = self.shared.motion.lock() => guard,
        };
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let command = codec::encode_filter(code);
        let mut updates = hub.filter.subscribe();
        let mut link_states = hub.link_state.subscribe();
        let previous = hub.filter.borrow().changing;
        hub.filter.send_modify(|state| state.changing = true);

        if let Err(e) = self.write_line_inner(&command, Some(cancel)).await {
            hub.filter.send_modify(|state| state.changing = previous);
            return Err(e);
        }

        let target = code.pair();
        let ack_timeout = self.shared.config.ack_timeout();
        let waited = tokio::time::timeout(ack_timeout, async {
            tokio::select! {
                biased;
                settled = updates.wait_for(|state| state.pair() == target && !state.changing) => {
                    Ok(settled.is_ok())
                }
                _ = link_states.wait_for(|state| !state.is_connected()) => Err(LinkError::NotConnected),
            }
        })
        .await;

        let acknowledged = match waited {
            Ok(Ok(acknowledged)) => acknowledged,
            Ok(Err(e)) => {
                warn!("Link lost while waiting for {} to be acknowledged", command);
                hub.filter.send_modify(|state| state.changing = false);
                return Err(e);
            }
            Err(_) => false,
        };

        if acknowledged {
            debug!("{} acknowledged", command);
        } else {
            warn!("No acknowledgement for {} within {:?}, assuming it completed", command, ack_timeout);
            hub.filter.send_modify(|state| state.settle(code, None, SystemTime::now()));
            hub.notify(Notification::AckTimeout { command, timeout: ack_timeout });
        }

        Ok(FilterChange { state: self.filter_state(), confirmed: acknowledged })
    }

    /// Move the wheel to `code`, re-expressed in the configured dialect.
    pub async fn select_filter(&self, code: FilterCode) -> Result<FilterChange> {
        let code = code.for_protocol(self.shared.config.filter_protocol)?;
        self.change_filter(code).await
    }

    /// `SPECTRAL:<a><b>`; digits are checked before anything is written.
    pub async fn set_spectral(&self, a: u8, b: u8) -> Result<FilterChange> {
        let pair = ColorPair::from_digits(a, b)?;
        self.change_filter(FilterCode::Spectral(pair)).await
    }

    pub async fn select_normal(&self) -> Result<FilterChange> {
        self.select_filter(LegacyFilter::Normal.into()).await
    }

    pub async fn select_red(&self) -> Result<FilterChange> {
        self.select_filter(LegacyFilter::Red.into()).await
    }

    pub async fn select_green(&self) -> Result<FilterChange> {
        self.select_filter(LegacyFilter::Green.into()).await
    }

    pub async fn select_blue(&self) -> Result<FilterChange> {
        self.select_filter(LegacyFilter::Blue.into()).await
    }

    pub async fn select_purple(&self) -> Result<FilterChange> {
        self.select_filter(LegacyFilter::Purple.into()).await
    }

    /// Publish a notification on this session's channel.
    pub fn notify(&self, notification: Notification) {
        self.shared.hub.notify(notification);
    }

    /// Decoded telemetry frames from now on, delivered at `rate`.
    pub fn telemetry(&self, rate: UpdateRate) -> BoxStream<'static, Arc<TelemetryFrame>> {
        let frames = lagging_aware(self.shared.hub.telemetry.subscribe(), "telemetry");
        match rate.period() {
            None => frames.boxed(),
            Some(period) => frames.sample_latest(period).boxed(),
        }
    }

    /// Current filter state, then every change.
    pub fn filter_updates(&self) -> WatchStream<FilterState> {
        WatchStream::new(self.shared.hub.filter.subscribe())
    }

    /// Current link state, then every change.
    pub fn link_states(&self) -> WatchStream<LinkState> {
        WatchStream::new(self.shared.hub.link_state.subscribe())
    }

    /// Notifications from now on.
    pub fn notifications(&self) -> BoxStream<'static, Notification> {
        lagging_aware(self.shared.hub.notifications.subscribe(), "notification").boxed()
    }
}

pub(crate) fn lagging_aware<T>(
    receiver: broadcast::Receiver<T>,
    channel: &'static str,
) -> impl futures::Stream<Item = T> + Send + 'static
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(value) => Some(value),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("{} subscriber lagged, skipped {} items", channel, skipped);
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SAMPLE_DATA_LINE, memory_session};
    use crate::transports::MemoryTransport;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn connect_and_disconnect_emit_transitions() {
        let (session, _endpoints) = memory_session(LinkConfig::default());
        let mut states = session.link_states();
        assert_eq!(states.next().await, Some(LinkState::Disconnected));

        session.connect().await.unwrap();
        assert!(session.is_connected());

        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(states.next().await, Some(LinkState::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_report_each_transition() {
        let (session, _endpoints) = memory_session(LinkConfig::default());
        let mut notifications = session.notifications();

        session.connect().await.unwrap();
        session.disconnect().await;
        // Idempotent: no further notifications
        session.disconnect().await;

        let expected = [LinkState::Connecting, LinkState::Connected, LinkState::Disconnected];
        for state in expected {
            assert_eq!(notifications.next().await, Some(Notification::ConnectionChanged { state }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_faults_and_reports() {
        let (transport, _endpoints) = MemoryTransport::new();
        transport.set_refuse(true);
        let session = LinkSession::new(transport, LinkConfig::default());
        let mut notifications = session.notifications();

        assert!(session.connect().await.is_err());
        assert_eq!(session.state(), LinkState::Faulted);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(notifications.next().await.unwrap());
        }
        assert_eq!(seen[1], Notification::ConnectionChanged { state: LinkState::Faulted });
        assert!(matches!(seen[2], Notification::TransportError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_require_a_connection() {
        let (session, _endpoints) = memory_session(LinkConfig::default());
        assert!(matches!(session.send_raw("PING").await, Err(LinkError::NotConnected)));
        assert!(matches!(session.send_raw("  ").await, Err(LinkError::InvalidCommand { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replaces_the_link() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut first = endpoints.accept().await.unwrap();

        session.connect().await.unwrap();
        let mut second = endpoints.accept().await.unwrap();

        // The old device end sees the host hang up
        assert_eq!(first.next_command().await.unwrap(), None);

        session.start_telemetry().await.unwrap();
        assert_eq!(second.next_command().await.unwrap().as_deref(), Some(START_TELEMETRY));
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn frames_flow_to_subscribers_and_counter_survives_reconnect() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        let mut frames = session.telemetry(UpdateRate::Native);

        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();
        device.send_line(SAMPLE_DATA_LINE).await.unwrap();
        assert_eq!(frames.next().await.unwrap().packet_number, 1);

        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();
        device.send_line(SAMPLE_DATA_LINE).await.unwrap();
        assert_eq!(frames.next().await.unwrap().packet_number, 2);
        assert_eq!(session.packets_decoded(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spectral_change_waits_for_ack() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let device_task = tokio::spawn(async move {
            let command = device.next_command().await.unwrap().unwrap();
            assert_eq!(command, "SPECTRAL:13");
            tokio::time::sleep(Duration::from_millis(300)).await;
            device.send_line("SPECTRAL_ACK:13").await.unwrap();
            device
        });

        let change = session.set_spectral(1, 3).await.unwrap();
        assert!(change.confirmed);
        assert_eq!(change.state.pair().digits(), (1, 3));
        assert!(!change.state.changing);
        device_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ack_falls_back_after_timeout() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        let mut notifications = session.notifications();
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let started = tokio::time::Instant::now();
        let change = session.change_filter(LegacyFilter::Red.into()).await.unwrap();

        assert!(!change.confirmed);
        assert!(started.elapsed() >= Duration::from_millis(1200));
        assert_eq!(change.state.code, FilterCode::Legacy(LegacyFilter::Red));
        assert_eq!(change.state.servo_degrees, Some(45));
        assert_eq!(device.next_command().await.unwrap().as_deref(), Some("$FILTER,R,45"));

        let mut saw_timeout = false;
        while let Some(notification) = notifications.next().await {
            if let Notification::AckTimeout { command, .. } = notification {
                assert_eq!(command, "$FILTER,R,45");
                saw_timeout = true;
                break;
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_while_waiting_for_ack_fails_the_change() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let device_task = tokio::spawn(async move {
            assert_eq!(device.next_command().await.unwrap().as_deref(), Some("SPECTRAL:13"));
            device.hang_up().await.unwrap();
        });

        let started = tokio::time::Instant::now();
        let result = session.set_spectral(1, 3).await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert!(started.elapsed() < Duration::from_millis(1200));

        let state = session.filter_state();
        assert_eq!(state.pair().digits(), (0, 0));
        assert!(!state.changing);
        assert_eq!(session.state(), LinkState::Faulted);
        device_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn announcing_an_overlong_sequence_writes_nothing() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let sequence = TimedSequence::parse("400n").unwrap();
        assert!(matches!(
            session.send_timed(&sequence).await,
            Err(LinkError::InvalidSequence { .. })
        ));
        session.release().await.unwrap();
        assert_eq!(device.next_command().await.unwrap().as_deref(), Some(RELEASE));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_digits_never_reach_the_wire() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        assert!(matches!(
            session.set_spectral(1, 4).await,
            Err(LinkError::InvalidColorDigit { digit: 4 })
        ));
        session.release().await.unwrap();
        assert_eq!(device.next_command().await.unwrap().as_deref(), Some(RELEASE));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_command_is_not_written() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = session.change_filter_cancellable(LegacyFilter::Blue.into(), &cancel).await;
        assert!(matches!(result, Err(LinkError::Cancelled)));
        assert!(!session.filter_state().changing);

        session.send_raw("PING").await.unwrap();
        assert_eq!(device.next_command().await.unwrap().as_deref(), Some("PING"));
    }

    #[tokio::test(start_paused = true)]
    async fn shortcuts_follow_configured_protocol() {
        let config = LinkConfig {
            filter_protocol: crate::types::FilterProtocol::Legacy,
            ..LinkConfig::default()
        };
        let (session, mut endpoints) = memory_session(config);
        session.connect().await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        let responder = tokio::spawn(async move {
            let command = device.next_command().await.unwrap().unwrap();
            device.send_line("$FILTER_ACK,P,270").await.unwrap();
            command
        });

        let change = session.select_purple().await.unwrap();
        assert!(change.confirmed);
        assert_eq!(responder.await.unwrap(), "$FILTER,P,270");
    }

    #[tokio::test(start_paused = true)]
    async fn device_hangup_faults_session() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        let mut states = session.link_states();
        session.connect().await.unwrap();
        let device = endpoints.accept().await.unwrap();

        device.hang_up().await.unwrap();
        while let Some(state) = states.next().await {
            if state == LinkState::Faulted {
                break;
            }
        }
        assert!(matches!(session.send_raw("PING").await, Err(LinkError::NotConnected)));

        session.disconnect().await;
        assert_eq!(session.state(), LinkState::Disconnected);
    }
}
