//! Error taxonomy for a single upstream exchange.
//!
//! Transport failures and protocol violations are kept apart so the layer
//! above can decide whether a fresh connection is worth a retry. Neither is
//! retried here.

use std::time::Duration;
use thiserror::Error;

/// Failure of the underlying byte stream, including every timeout.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Read, write or connect failed at the socket level.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single read made no progress within the per-read timeout.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// A write did not complete within the I/O timeout.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Connecting to the upstream did not complete in time.
    #[error("connect to {authority} timed out after {timeout:?}")]
    ConnectTimeout { authority: String, timeout: Duration },

    /// The peer closed the stream before a complete message arrived.
    #[error("connection closed by peer before the response was complete")]
    UnexpectedEof,

    /// The peer kept sending informational responses past the allowed count.
    #[error("gave up after {0} interim responses without a final status")]
    TooManyInterimResponses(usize),

    /// No final response head arrived before the overall head deadline.
    #[error("no final response head within {0:?}")]
    HeadDeadline(Duration),
}

/// Malformed response syntax. Unrecoverable for the current exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Status line or header block could not be parsed.
    #[error("malformed response head: {0}")]
    MalformedHead(String),

    /// Status code outside 100..=599.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// Header block larger than the configured limit.
    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// More header fields than the configured limit.
    #[error("response carries more than {0} header fields")]
    TooManyHeaders(usize),

    /// Missing, duplicated-and-conflicting, or unparseable `Content-Length`.
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// Chunk size line or chunk terminator was not valid.
    #[error("invalid chunked encoding: {0}")]
    InvalidChunk(String),

    /// Body larger than the configured limit.
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// Any failure of [`ResponseReader::read`](crate::http::ResponseReader::read).
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<std::io::Error> for ExchangeError {
    fn from(e: std::io::Error) -> Self {
        ExchangeError::Transport(TransportError::Io(e))
    }
}

impl ExchangeError {
    /// True when the failure came from the transport rather than the peer's syntax.
    pub fn is_transport(&self) -> bool {
        matches!(self, ExchangeError::Transport(_))
    }

    /// True when the failure is a malformed message.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ExchangeError::Protocol(_))
    }
}
