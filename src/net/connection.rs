//! Server-facing transport connection.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Own the byte stream and its read-ahead buffer
//! - Bound every read and write by the per-I/O timeout
//! - Convert into an [`UpgradedChannel`] without losing read-ahead bytes

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::TimeoutConfig;
use crate::http::error::{ExchangeError, ProtocolError, TransportError};
use crate::net::upgraded::UpgradedChannel;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const READ_CHUNK: usize = 8 * 1024;

/// Process-wide identifier of an upstream connection, kept across an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

/// Any bidirectional byte stream a connection can run over.
///
/// `Sync` so idle connections can sit in the shared pool.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

/// A live connection to an upstream server.
///
/// Reads go through an internal buffer so a response head can be split off
/// without consuming the bytes that follow it.
pub struct TransportConnection {
    id: ConnectionId,
    authority: String,
    io: Box<dyn Transport>,
    buf: BytesMut,
    io_timeout: Duration,
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection")
            .field("id", &self.id)
            .field("authority", &self.authority)
            .field("buffered", &self.buf.len())
            .finish()
    }
}

impl TransportConnection {
    /// Wrap an already-established stream.
    pub fn new<T: Transport>(io: T, authority: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            id: ConnectionId::next(),
            authority: authority.into(),
            io: Box::new(io),
            buf: BytesMut::with_capacity(READ_CHUNK),
            io_timeout,
        }
    }

    /// Open a TCP connection to `authority` (`host:port`).
    pub async fn connect(authority: &str, timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let connect_timeout = timeouts.connect();
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(authority)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    authority: authority.to_string(),
                    timeout: connect_timeout,
                })
            }
        };
        stream.set_nodelay(true)?;

        let conn = Self::new(stream, authority, timeouts.read());
        tracing::debug!(connection_id = %conn.id, authority = %authority, "Upstream connected");
        Ok(conn)
    }

    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The `host:port` this connection talks to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Bytes read from the peer but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read more bytes into the buffer. `Ok(0)` means the peer closed the stream.
    async fn fill(&mut self) -> Result<usize, TransportError> {
        if self.buf.capacity() == self.buf.len() {
            self.buf.reserve(READ_CHUNK);
        }
        match tokio::time::timeout(self.io_timeout, self.io.read_buf(&mut self.buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::ReadTimeout(self.io_timeout)),
        }
    }

    /// Read one complete message head: start line, header fields and the empty line.
    ///
    /// Bytes after the empty line stay buffered.
    pub async fn read_head(&mut self, max_bytes: usize) -> Result<BytesMut, ExchangeError> {
        loop {
            if let Some(end) = find_head_end(&self.buf) {
                if end > max_bytes {
                    return Err(ProtocolError::HeadTooLarge(max_bytes).into());
                }
                return Ok(self.buf.split_to(end));
            }
            if self.buf.len() > max_bytes {
                return Err(ProtocolError::HeadTooLarge(max_bytes).into());
            }
            if self.fill().await? == 0 {
                return Err(TransportError::UnexpectedEof.into());
            }
        }
    }

    /// Read a single line, returned without its line terminator.
    pub async fn read_line(&mut self, max_bytes: usize) -> Result<Bytes, ExchangeError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                return Ok(line.freeze());
            }
            if self.buf.len() > max_bytes {
                return Err(ProtocolError::InvalidChunk(format!(
                    "line longer than {max_bytes} bytes"
                ))
                .into());
            }
            if self.fill().await? == 0 {
                return Err(TransportError::UnexpectedEof.into());
            }
        }
    }

    /// Read exactly `len` bytes.
    pub async fn read_exact_bytes(&mut self, len: usize) -> Result<Bytes, TransportError> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                return Err(TransportError::UnexpectedEof);
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    /// Read until the peer closes the stream.
    pub async fn read_to_eof(&mut self, max_bytes: usize) -> Result<Bytes, ExchangeError> {
        loop {
            if self.buf.len() > max_bytes {
                return Err(ProtocolError::BodyTooLarge(max_bytes).into());
            }
            if self.fill().await? == 0 {
                return Ok(self.buf.split().freeze());
            }
        }
    }

    /// Write and flush `bytes` to the peer.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let io = &mut self.io;
        let write = async move {
            io.write_all(bytes).await?;
            io.flush().await
        };
        match tokio::time::timeout(self.io_timeout, write).await {
            Ok(result) => result.map_err(TransportError::Io),
            Err(_) => Err(TransportError::WriteTimeout(self.io_timeout)),
        }
    }

    /// Close the write side. Errors are ignored; the connection is going away.
    pub async fn shutdown(mut self) {
        let _ = tokio::time::timeout(self.io_timeout, self.io.shutdown()).await;
        tracing::trace!(connection_id = %self.id, "Upstream connection closed");
    }

    /// Give up HTTP ownership of the stream. Read-ahead bytes move with it.
    pub(crate) fn into_upgraded(self) -> UpgradedChannel {
        UpgradedChannel::new(self.id, self.authority, self.buf.freeze(), self.io)
    }
}

/// Offset just past the empty line that terminates a message head.
///
/// Accepts both CRLF and bare LF line endings.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some(i + 2),
                (Some(b'\r'), Some(b'\n')) => return Some(i + 3),
                _ => {}
            }
        }
        i += 1;
    }
    None
}
