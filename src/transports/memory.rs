//! In-process transport backed by `tokio::io::duplex`

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::{LinkIo, PortSettings, Transport};
use crate::{LinkError, Result};

/// Duplex buffer size in bytes.
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Transport whose "device" is driven by the test or demo holding the other end.
///
/// Every successful [`open`](Transport::open) creates a fresh duplex pipe and
/// delivers its device side through [`DeviceEndpoints`].
pub struct MemoryTransport {
    endpoints: mpsc::UnboundedSender<DeviceEnd>,
    refuse: AtomicBool,
}

/// Receives the device side of each link opened on a [`MemoryTransport`].
pub struct DeviceEndpoints {
    rx: mpsc::UnboundedReceiver<DeviceEnd>,
}

impl DeviceEndpoints {
    /// Wait for the next opened link.
    pub async fn accept(&mut self) -> Option<DeviceEnd> {
        self.rx.recv().await
    }
}

impl MemoryTransport {
    pub fn new() -> (Self, DeviceEndpoints) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { endpoints: tx, refuse: AtomicBool::new(false) }, DeviceEndpoints { rx })
    }

    /// Make subsequent opens fail, as if the port were unplugged.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, settings: &PortSettings) -> Result<LinkIo> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LinkError::connection_failed(format!("{} refused the connection", settings)));
        }

        let (host, device) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.endpoints
            .send(DeviceEnd::new(device))
            .map_err(|_| LinkError::connection_failed("device endpoint receiver dropped"))?;

        debug!("Opened memory link {}", settings);
        Ok(LinkIo::from_stream(host))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Device side of an in-memory link.
pub struct DeviceEnd {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl DeviceEnd {
    pub(crate) fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader: BufReader::new(reader), writer }
    }

    /// Send raw bytes to the host, exactly as given.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Send one line to the host, terminated with `\r\n` like the device firmware.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.send_bytes(format!("{line}\r\n").as_bytes()).await
    }

    /// Next command written by the host, without its terminator.
    ///
    /// Returns `None` once the host has closed the link.
    pub async fn next_command(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let command = line.trim();
            if !command.is_empty() {
                return Ok(Some(command.to_string()));
            }
        }
    }

    /// Close the device side; the host sees end of stream.
    pub async fn hang_up(mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn open_hands_device_end_to_endpoints() {
        let (transport, mut endpoints) = MemoryTransport::new();
        let mut io = transport.open(&PortSettings::new("mem0", 9600)).await.unwrap();
        let mut device = endpoints.accept().await.unwrap();

        io.writer.write_all(b"SPECTRAL:13\n").await.unwrap();
        assert_eq!(device.next_command().await.unwrap().as_deref(), Some("SPECTRAL:13"));

        device.send_line("SPECTRAL_ACK:13").await.unwrap();
        let mut buf = [0u8; 17];
        io.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SPECTRAL_ACK:13\r\n");
    }

    #[tokio::test]
    async fn refused_open_fails() {
        let (transport, _endpoints) = MemoryTransport::new();
        transport.set_refuse(true);
        let err = transport.open(&PortSettings::new("mem0", 9600)).await.err().unwrap();
        assert!(matches!(err, LinkError::Connection { .. }));
    }

    #[tokio::test]
    async fn host_close_ends_command_stream() {
        let (transport, mut endpoints) = MemoryTransport::new();
        let io = transport.open(&PortSettings::new("mem0", 9600)).await.unwrap();
        let mut device = endpoints.accept().await.unwrap();
        drop(io);
        assert_eq!(device.next_command().await.unwrap(), None);
    }
}
