//! Test utilities shared by unit tests and benchmarks
//!
//! Sample wire lines, generated byte streams, and a session wired to an
//! in-memory transport whose device side the test drives by hand.

#![cfg(any(test, feature = "benchmark"))]

use tokio::task::JoinHandle;

use crate::codec::{FILTER_ACK_PREFIX, FILTER_PREFIX, SPECTRAL_ACK_PREFIX, SPECTRAL_PREFIX};
use crate::config::LinkConfig;
use crate::decoder::encode_data_line;
use crate::session::LinkSession;
use crate::simulator::TelemetryModel;
use crate::transports::{DeviceEnd, DeviceEndpoints, MemoryTransport};

/// Reference telemetry line with known decoded values.
pub const SAMPLE_DATA_LINE: &str = "$DATA,1,25.5,1013.2,1500.0,45.2,3.85,12.5,-8.3,15.7";

/// Install a test-friendly tracing subscriber; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `count` `$DATA` lines from the telemetry model, `\r\n` terminated, as one byte buffer.
pub fn sample_stream(count: usize) -> Vec<u8> {
    let mut model = TelemetryModel::new();
    let mut bytes = Vec::with_capacity(count * 64);
    for sequence in 1..=count as u64 {
        bytes.extend_from_slice(encode_data_line(sequence, &model.step(1.0)).as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes
}

/// A session over a fresh [`MemoryTransport`], not yet connected.
pub fn memory_session(config: LinkConfig) -> (LinkSession, DeviceEndpoints) {
    init_tracing();
    let (transport, endpoints) = MemoryTransport::new();
    (LinkSession::new(transport, config), endpoints)
}

/// Acknowledge every filter command immediately; returns all commands seen once the host hangs up.
pub fn spawn_auto_ack(mut device: DeviceEnd) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(Some(command)) = device.next_command().await {
            let reply = if let Some(pair) = command.strip_prefix(SPECTRAL_PREFIX) {
                Some(format!("{SPECTRAL_ACK_PREFIX}{pair}"))
            } else {
                command.strip_prefix(FILTER_PREFIX).map(|fields| format!("{FILTER_ACK_PREFIX}{fields}"))
            };
            if let Some(reply) = reply {
                if device.send_line(&reply).await.is_err() {
                    break;
                }
            }
            seen.push(command);
        }
        seen
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::LineFramer;

    #[test]
    fn sample_stream_frames_into_data_lines() {
        let lines = LineFramer::new().ingest(&sample_stream(5));
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|line| line.starts_with("$DATA,")));
        assert!(lines[4].starts_with("$DATA,5,"));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_ack_confirms_changes() {
        let (session, mut endpoints) = memory_session(LinkConfig::default());
        session.connect().await.unwrap();
        let device = spawn_auto_ack(endpoints.accept().await.unwrap());

        assert!(session.set_spectral(2, 3).await.unwrap().confirmed);
        session.disconnect().await;
        assert_eq!(device.await.unwrap(), vec!["SPECTRAL:23".to_string()]);
    }
}
