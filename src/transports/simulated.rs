//! Simulated payload: a device task on the far end of an in-memory link
//!
//! The device streams `$DATA` lines from a [`TelemetryModel`] and answers filter
//! commands the way the payload firmware does:
//!
//! - `SPECTRAL:xy` → `SPECTRAL_ACK:xy` after the settle delay
//! - `$FILTER,L,d` → `$FILTER_STATUS,L,d,BUSY` at once, `$FILTER_ACK,L,d` after the settle delay
//! - `$TIMED_FILTER,...`, `START_TELEMETRY`, `RELEASE` → no reply

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::codec::{
    FILTER_ACK_PREFIX, FILTER_PREFIX, FILTER_STATUS_PREFIX, RELEASE, SPECTRAL_ACK_PREFIX,
    SPECTRAL_PREFIX, START_TELEMETRY, TIMED_FILTER_PREFIX,
};
use crate::decoder::encode_data_line;
use crate::framer::{FramedLine, LineFramer};
use crate::simulator::TelemetryModel;
use crate::transport::{LinkIo, PortSettings, Transport};
use crate::types::{ColorPair, LegacyFilter};
use crate::{LinkError, Result};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Behaviour of a [`SimulatedDevice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Time between `$DATA` lines
    pub telemetry_period: Duration,
    /// Time the wheel takes to settle before it acknowledges
    pub settle_delay: Duration,
    /// Stream telemetry as soon as the link opens instead of waiting for `START_TELEMETRY`
    pub stream_on_open: bool,
    /// Send acknowledgements at all
    pub acknowledge: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            telemetry_period: Duration::from_secs(1),
            settle_delay: Duration::from_millis(200),
            stream_on_open: true,
            acknowledge: true,
        }
    }
}

/// Transport whose far end is a simulated payload.
///
/// Each [`open`](Transport::open) starts a fresh device task with its own
/// telemetry model. The task ends when the host drops its side of the link.
#[derive(Clone, Default)]
pub struct SimulatedDevice {
    settings: SimulatorSettings,
    received: Arc<Mutex<Vec<String>>>,
}

impl SimulatedDevice {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self { settings, received: Arc::default() }
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// Every command the device has received, across all links, in arrival order.
    pub fn received_commands(&self) -> Vec<String> {
        self.received.lock().map(|commands| commands.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Transport for SimulatedDevice {
    async fn open(&self, settings: &PortSettings) -> Result<LinkIo> {
        if self.settings.telemetry_period.is_zero() {
            return Err(LinkError::config("simulator telemetry period must be non-zero"));
        }

        let (host, device) = tokio::io::duplex(DUPLEX_CAPACITY);
        let task = DeviceTask::new(self.settings.clone(), Arc::clone(&self.received));
        tokio::spawn(task.run(device));

        info!("Simulated device attached on {}", settings);
        Ok(LinkIo::from_stream(host))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct DeviceTask {
    settings: SimulatorSettings,
    received: Arc<Mutex<Vec<String>>>,
    model: TelemetryModel,
    wire_sequence: u64,
    streaming: bool,
    pending: VecDeque<(Instant, String)>,
}

impl DeviceTask {
    fn new(settings: SimulatorSettings, received: Arc<Mutex<Vec<String>>>) -> Self {
        let streaming = settings.stream_on_open;
        Self {
            settings,
            received,
            model: TelemetryModel::new(),
            wire_sequence: 0,
            streaming,
            pending: VecDeque::new(),
        }
    }

    async fn run(mut self, stream: tokio::io::DuplexStream) {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut commands = FramedRead::new(reader, LineFramer::new());

        let period = self.settings.telemetry_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_reply = self.pending.front().map(|(due, _)| *due);

            let outcome = tokio::select! {
                command = commands.next() => match command {
                    Some(Ok(FramedLine::Line(line))) => {
                        self.handle_command(&line, &mut writer).await
                    }
                    Some(Ok(FramedLine::Oversized { discarded })) => {
                        warn!("Simulated device dropped a {} byte command", discarded);
                        Ok(())
                    }
                    Some(Err(e)) => {
                        warn!("Simulated device read failed: {}", e);
                        break;
                    }
                    None => {
                        debug!("Host closed the simulated link");
                        break;
                    }
                },
                _ = tokio::time::sleep_until(next_reply.unwrap_or_else(Instant::now)), if next_reply.is_some() => {
                    match self.pending.pop_front() {
                        Some((_, reply)) => send(&mut writer, &reply).await,
                        None => Ok(()),
                    }
                }
                _ = ticker.tick(), if self.streaming => {
                    self.wire_sequence += 1;
                    let readings = self.model.step(period.as_secs_f64());
                    send(&mut writer, &encode_data_line(self.wire_sequence, &readings)).await
                }
            };

            if let Err(e) = outcome {
                debug!("Simulated device stopped writing: {}", e);
                break;
            }
        }

        info!("Simulated device detached after {} telemetry lines", self.wire_sequence);
    }

    async fn handle_command<W>(&mut self, line: &str, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let command = line.trim();
        trace!("Simulated device received {}", command);
        if let Ok(mut received) = self.received.lock() {
            received.push(command.to_string());
        }

        if command.eq_ignore_ascii_case(START_TELEMETRY) {
            self.streaming = true;
            return Ok(());
        }
        if command.eq_ignore_ascii_case(RELEASE) {
            info!("Simulated payload released");
            return Ok(());
        }
        if !self.settings.acknowledge {
            return Ok(());
        }

        let due = Instant::now() + self.settings.settle_delay;
        if let Some(payload) = command.strip_prefix(SPECTRAL_PREFIX) {
            match ColorPair::parse(payload) {
                Ok(pair) => self.pending.push_back((due, format!("{SPECTRAL_ACK_PREFIX}{pair}"))),
                Err(e) => warn!("Simulated device ignored {}: {}", command, e),
            }
        } else if let Some(payload) = command.strip_prefix(FILTER_PREFIX) {
            let letter = payload.split(',').next().and_then(|field| field.trim().chars().next());
            match letter.map(LegacyFilter::from_letter) {
                Some(Ok(filter)) => {
                    let fields = format!("{},{}", filter.letter(), filter.servo_degrees());
                    send(writer, &format!("{FILTER_STATUS_PREFIX}{fields},BUSY")).await?;
                    self.pending.push_back((due, format!("{FILTER_ACK_PREFIX}{fields}")));
                }
                _ => warn!("Simulated device ignored {}", command),
            }
        } else if command.starts_with(TIMED_FILTER_PREFIX) {
            debug!("Simulated device accepted timed sequence {}", command);
        }
        Ok(())
    }
}

async fn send<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    use crate::transport::{LinkReader, LinkWriter};

    async fn open(device: &SimulatedDevice) -> (FramedRead<LinkReader, LineFramer>, LinkWriter) {
        let io = device.open(&PortSettings::new("sim0", 9600)).await.unwrap();
        (FramedRead::new(io.reader, LineFramer::new()), io.writer)
    }

    async fn next_line(lines: &mut FramedRead<LinkReader, LineFramer>) -> String {
        match lines.next().await {
            Some(Ok(FramedLine::Line(line))) => line,
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn streams_data_lines() {
        let device = SimulatedDevice::default();
        let (mut lines, _writer) = open(&device).await;

        let first = next_line(&mut lines).await;
        let second = next_line(&mut lines).await;
        assert!(first.starts_with("$DATA,1,"));
        assert!(second.starts_with("$DATA,2,"));
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledges_spectral_after_settling() {
        let device = SimulatedDevice::new(SimulatorSettings { stream_on_open: false, ..Default::default() });
        let (mut lines, mut writer) = open(&device).await;

        let sent = Instant::now();
        writer.write_all(b"SPECTRAL:13\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "SPECTRAL_ACK:13");
        assert!(sent.elapsed() >= Duration::from_millis(200));
        assert_eq!(device.received_commands(), vec!["SPECTRAL:13".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_filter_reports_busy_then_ack() {
        let device = SimulatedDevice::new(SimulatorSettings { stream_on_open: false, ..Default::default() });
        let (mut lines, mut writer) = open(&device).await;

        writer.write_all(b"$FILTER,P,270\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "$FILTER_STATUS,P,270,BUSY");
        assert_eq!(next_line(&mut lines).await, "$FILTER_ACK,P,270");
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_waits_for_start_command() {
        let device = SimulatedDevice::new(SimulatorSettings { stream_on_open: false, ..Default::default() });
        let (mut lines, mut writer) = open(&device).await;

        writer.write_all(b"$TIMED_FILTER,3g\nSTART_TELEMETRY\n").await.unwrap();
        assert!(next_line(&mut lines).await.starts_with("$DATA,1,"));
        assert_eq!(
            device.received_commands(),
            vec!["$TIMED_FILTER,3g".to_string(), START_TELEMETRY.to_string()]
        );
    }
}
