//! Driver spawns and manages the inbound line reader

use futures::StreamExt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{self, Inbound};
use crate::framer::{FramedLine, LineFramer};
use crate::session::{Hub, Notification};
use crate::transport::LinkReader;

/// Driver spawns and manages the reader task for one open link
///
/// The reader owns the read half and the framer. Lines are processed strictly
/// in arrival order: filter traffic goes to the codec and updates the filter
/// state, everything else goes to the telemetry decoder.
pub struct Driver;

impl Driver {
    /// Spawn the reader task for a link opened as `generation`.
    ///
    /// The task ends when `cancel` fires or the link fails. A failure that is
    /// not caused by cancellation faults the session.
    pub(crate) fn spawn(
        reader: LinkReader,
        hub: Arc<Hub>,
        generation: u64,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self::line_reader_task(reader, hub, generation, cancel).await;
        })
    }

    async fn line_reader_task(
        reader: LinkReader,
        hub: Arc<Hub>,
        generation: u64,
        cancel: CancellationToken,
    ) {
        info!("Line reader started (link generation {})", generation);
        let mut lines = FramedRead::new(reader, LineFramer::with_max_line_len(hub.max_line_len));
        let mut line_count = 0u64;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Line reader cancelled");
                    break;
                }
                next = lines.next() => next,
            };

            match next {
                Some(Ok(FramedLine::Line(line))) => {
                    line_count += 1;
                    Self::route_line(&hub, &line);
                }
                Some(Ok(FramedLine::Oversized { discarded })) => {
                    hub.notify(Notification::LineTooLong { discarded });
                }
                Some(Err(e)) => {
                    if !cancel.is_cancelled() {
                        error!("Link read failed after {} lines: {}", line_count, e);
                        hub.fault(generation, format!("read failed: {e}"));
                    }
                    break;
                }
                None => {
                    if !cancel.is_cancelled() {
                        warn!("Link closed by the device after {} lines", line_count);
                        hub.fault(generation, "link closed by the device".to_string());
                    }
                    break;
                }
            }
        }

        info!("Line reader ended (processed {} lines)", line_count);
    }

    /// Route one framed line to the codec, then to the decoder.
    pub(crate) fn route_line(hub: &Hub, line: &str) {
        trace!("Inbound line: {}", line);

        match codec::decode_inbound(line) {
            Inbound::Filter(message) => {
                debug!("Filter message: {:?}", message);
                hub.filter.send_modify(|state| message.apply(state, SystemTime::now()));
            }
            Inbound::Malformed { line, reason } => {
                warn!("Malformed filter message '{}': {}", line, reason);
                hub.notify(Notification::MalformedFilterMessage { line: line.to_string(), reason });
            }
            Inbound::NotFilter(line) => match hub.decode(line) {
                Ok(frame) => {
                    // No subscribers is fine; frames are not buffered for late joiners
                    let _ = hub.telemetry.send(Arc::new(frame));
                }
                Err(rejection) if rejection.is_ignorable() => {
                    trace!("Ignored line '{}'", line);
                }
                Err(rejection) => {
                    warn!("Rejected line '{}': {}", line, rejection);
                    hub.notify(Notification::FrameRejected { line: line.to_string(), rejection });
                }
            },
        }
    }
}
