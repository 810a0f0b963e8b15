//! Transport abstraction
//!
//! The responder core is transport-agnostic: it consumes anything that can
//! move bytes on the three MTP pipes (bulk-OUT for commands and data from
//! the host, bulk-IN for data and responses, interrupt-IN for events).
//! A USB gadget endpoint set is the production shape; `TcpTransport` below
//! provides the same surface over a socket for development and testing.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host aborted the in-flight transfer (bulk pipe cancelled)
    #[error("transfer cancelled by host")]
    Cancelled,

    /// No packet arrived within the poll interval on the command pipe
    #[error("read timed out")]
    TimedOut,

    /// The link is gone
    #[error("transport disconnected")]
    Disconnected,

    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level pipe set the responder runs over
///
/// Methods take `&self` so the engine can interleave event emission with
/// the request loop; implementations serialize internally as needed.
pub trait Transport: Send + Sync {
    /// Receive the next bulk-OUT packet into `buf`, returning its length.
    /// May return fewer bytes than `buf` holds; a short packet terminates
    /// a variable-length transfer.
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Send a bulk-IN packet.
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Send an interrupt-IN (event) packet.
    fn send_event(&self, buf: &[u8]) -> Result<usize, TransportError>;
}

/// Development transport over a single accepted TCP connection
///
/// Bulk IN/OUT map onto the stream. There is no third pipe on a socket,
/// so interrupt events are logged and dropped rather than interleaved
/// into the byte stream where they would corrupt framing.
pub struct TcpTransport {
    stream: parking_lot::Mutex<TcpStream>,
}

impl TcpTransport {
    /// Bind `addr`, accept one connection, and wrap it.
    ///
    /// The command-pipe read polls with a 1 second timeout so the request
    /// loop can observe its shutdown flag.
    pub fn accept<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        let (stream, peer) = listener.accept()?;
        tracing::info!("host connected from {}", peer);

        stream.set_read_timeout(Some(Duration::from_secs(1)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: parking_lot::Mutex::new(stream),
        })
    }

    /// Wrap an already-connected stream (used by tests).
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_read_timeout(Some(Duration::from_secs(1)))?;
        Ok(Self {
            stream: parking_lot::Mutex::new(stream),
        })
    }
}

impl Transport for TcpTransport {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut stream = self.stream.lock();
        match stream.read(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::TimedOut),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::TimedOut),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let mut stream = self.stream.lock();
        stream.write_all(buf)?;
        Ok(buf.len())
    }

    fn send_event(&self, buf: &[u8]) -> Result<usize, TransportError> {
        // No interrupt pipe on a socket; see the type docs.
        tracing::debug!("dropping {}-byte event (no interrupt pipe)", buf.len());
        Ok(buf.len())
    }
}
