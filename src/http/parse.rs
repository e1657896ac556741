//! Status line and header block parsing.

use http::header::{HeaderName, HeaderValue};
use http::{StatusCode, Version};

use crate::http::error::ProtocolError;
use crate::http::response::{Headers, StatusLine};

/// Parse a complete response head, as returned by
/// [`TransportConnection::read_head`](crate::net::TransportConnection::read_head).
pub fn parse_head(head: &[u8], max_headers: usize) -> Result<(StatusLine, Headers), ProtocolError> {
    let mut slots = vec![httparse::EMPTY_HEADER; max_headers];
    let mut parsed = httparse::Response::new(&mut slots);

    match parsed.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(ProtocolError::MalformedHead("incomplete response head".into()))
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ProtocolError::TooManyHeaders(max_headers)),
        Err(e) => return Err(ProtocolError::MalformedHead(e.to_string())),
    }

    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => {
            return Err(ProtocolError::MalformedHead(format!(
                "unsupported HTTP/1.{:?}",
                other
            )))
        }
    };

    let code = parsed
        .code
        .ok_or_else(|| ProtocolError::MalformedHead("missing status code".into()))?;
    if !(100..=599).contains(&code) {
        return Err(ProtocolError::InvalidStatus(code));
    }
    let status = StatusCode::from_u16(code).map_err(|_| ProtocolError::InvalidStatus(code))?;

    let mut headers = Headers::new();
    for h in parsed.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|e| ProtocolError::MalformedHead(format!("header name {:?}: {}", h.name, e)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|e| ProtocolError::MalformedHead(format!("header {}: {}", name, e)))?;
        headers.push(name, value);
    }

    let status_line = StatusLine {
        version,
        status,
        reason: parsed.reason.unwrap_or_default().to_string(),
    };
    Ok((status_line, headers))
}
