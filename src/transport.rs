//! Transport trait for byte-stream links

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;

/// Baud rates the ground station offers for serial links.
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Where and how fast to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub port: String,
    pub baud_rate: u32,
}

impl PortSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self { port: port.into(), baud_rate }
    }
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.baud_rate)
    }
}

/// Read half of an open link.
pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an open link.
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The two halves of an open link.
///
/// Dropping both halves closes the link.
pub struct LinkIo {
    pub reader: LinkReader,
    pub writer: LinkWriter,
}

impl LinkIo {
    pub fn new(reader: LinkReader, writer: LinkWriter) -> Self {
        Self { reader, writer }
    }

    /// Split any bidirectional stream into link halves.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader: Box::new(reader), writer: Box::new(writer) }
    }
}

/// Trait for byte-stream transports
///
/// A transport knows how to open a link to the device; everything after that
/// (framing, decoding, write serialization) belongs to the
/// [`LinkSession`](crate::session::LinkSession), which is the only holder of the
/// returned halves. A physical serial port implements this trait by opening the
/// port and handing back its read and write halves.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new link.
    ///
    /// Returns:
    /// - `Ok(io)` - Link is open and ready for traffic
    /// - `Err(e)` - Port missing, busy, or refused
    async fn open(&self, settings: &PortSettings) -> Result<LinkIo>;

    /// Short name for logs
    fn name(&self) -> &str;
}
