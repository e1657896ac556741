//! Response body reading.
//!
//! # Responsibilities
//! - Work out how a final response delimits its body
//! - Read Content-Length, chunked and close-delimited bodies
//! - Enforce the body size limit
//!
//! Never called for `101 Switching Protocols`: the bytes after that head
//! belong to the upgraded protocol.

use std::future::Future;

use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, StatusCode};

use crate::http::error::{ExchangeError, ProtocolError};
use crate::http::response::{Body, BodyFraming, Headers, StatusLine};
use crate::net::TransportConnection;

/// Longest chunk-size or trailer line accepted.
const MAX_CHUNK_LINE: usize = 4096;

/// Reads the body of a final, non-upgrade response.
pub trait BodyStrategy: Send + Sync {
    fn read_body(
        &self,
        status_line: &StatusLine,
        headers: &Headers,
        method: &Method,
        conn: &mut TransportConnection,
    ) -> impl Future<Output = Result<Body, ExchangeError>> + Send;
}

/// Standard HTTP/1.1 message framing, buffering the whole body.
#[derive(Debug, Clone)]
pub struct FramedBody {
    max_body_bytes: usize,
}

impl FramedBody {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    async fn read_chunked(&self, conn: &mut TransportConnection) -> Result<BytesMut, ExchangeError> {
        let mut body = BytesMut::new();
        loop {
            let line = conn.read_line(MAX_CHUNK_LINE).await?;
            let size = parse_chunk_size(&line)?;
            if size == 0 {
                break;
            }
            (body.len() as u64)
                .checked_add(size)
                .filter(|&total| total <= self.max_body_bytes as u64)
                .ok_or(ProtocolError::BodyTooLarge(self.max_body_bytes))?;
            let data = conn.read_exact_bytes(size as usize).await?;
            body.extend_from_slice(&data);

            let terminator = conn.read_line(MAX_CHUNK_LINE).await?;
            if !terminator.is_empty() {
                return Err(ProtocolError::InvalidChunk("missing CRLF after chunk data".into()).into());
            }
        }

        // Trailer fields are read and dropped.
        loop {
            let trailer = conn.read_line(MAX_CHUNK_LINE).await?;
            if trailer.is_empty() {
                break;
            }
        }
        Ok(body)
    }
}

impl BodyStrategy for FramedBody {
    async fn read_body(
        &self,
        status_line: &StatusLine,
        headers: &Headers,
        method: &Method,
        conn: &mut TransportConnection,
    ) -> Result<Body, ExchangeError> {
        let framing = framing_for(status_line.status, headers, method)?;
        let bytes = match framing {
            BodyFraming::NoBody => return Ok(Body::empty(framing)),
            BodyFraming::Length(len) => {
                if len > self.max_body_bytes as u64 {
                    return Err(ProtocolError::BodyTooLarge(self.max_body_bytes).into());
                }
                conn.read_exact_bytes(len as usize).await?
            }
            BodyFraming::Chunked => self.read_chunked(conn).await?.freeze(),
            BodyFraming::CloseDelimited => conn.read_to_eof(self.max_body_bytes).await?,
        };

        tracing::trace!(connection_id = %conn.id(), ?framing, len = bytes.len(), "Response body read");
        Ok(Body { framing, bytes })
    }
}

/// How the body of a final response is delimited.
pub fn framing_for(status: StatusCode, headers: &Headers, method: &Method) -> Result<BodyFraming, ProtocolError> {
    if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::NoBody);
    }

    // Transfer-Encoding overrides Content-Length. Only a final `chunked`
    // coding delimits the body; anything else runs to connection close.
    let last_coding = headers
        .all(&TRANSFER_ENCODING)
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .last();
    if let Some(coding) = last_coding {
        return Ok(if coding.eq_ignore_ascii_case("chunked") {
            BodyFraming::Chunked
        } else {
            BodyFraming::CloseDelimited
        });
    }

    let mut length: Option<u64> = None;
    for value in headers.all(&CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| ProtocolError::InvalidContentLength("non-ASCII value".into()))?;
        for part in text.split(',') {
            let part = part.trim();
            let parsed: u64 = part
                .parse()
                .map_err(|_| ProtocolError::InvalidContentLength(part.to_string()))?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(ProtocolError::InvalidContentLength(format!(
                        "conflicting values {existing} and {parsed}"
                    )))
                }
                _ => length = Some(parsed),
            }
        }
    }

    Ok(match length {
        Some(len) => BodyFraming::Length(len),
        None => BodyFraming::CloseDelimited,
    })
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidChunk("non-ASCII chunk size".into()))?;
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16).map_err(|_| ProtocolError::InvalidChunk(format!("bad size {size:?}")))
}
