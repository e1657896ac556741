//! Upstream response model.
//!
//! A [`Response`] is assembled by the reader and handed out read-only once
//! its final status is known. Header order and duplicates are preserved as
//! received.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{StatusCode, Version};

/// `HTTP/x.y CODE reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
}

impl StatusLine {
    /// 1xx other than 101. These are skipped while waiting for the final response.
    pub fn is_interim(&self) -> bool {
        self.status.is_informational() && self.status != StatusCode::SWITCHING_PROTOCOLS
    }

    /// `101 Switching Protocols`.
    pub fn is_switching_protocols(&self) -> bool {
        self.status == StatusCode::SWITCHING_PROTOCOLS
    }
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {} {}", self.version, self.status.as_u16(), self.reason)
    }
}

/// One header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: HeaderName,
    pub value: HeaderValue,
}

/// Header fields in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push(Header { name, value });
    }

    /// First value for `name`. Names compare case-insensitively.
    pub fn first(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.0.iter().find(|h| h.name == *name).map(|h| &h.value)
    }

    /// Every value for `name`, in order.
    pub fn all<'a, 'n>(&'a self, name: &'n HeaderName) -> impl Iterator<Item = &'a HeaderValue> + 'n
    where
        'a: 'n,
    {
        self.0.iter().filter(move |h| h.name == *name).map(|h| &h.value)
    }

    /// Whether any comma-separated element of any `name` field equals `token`,
    /// ignoring ASCII case.
    pub fn has_token(&self, name: &HeaderName, token: &str) -> bool {
        self.all(name)
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How the end of a response body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// The response cannot carry a body (1xx, 204, 304, HEAD).
    NoBody,
    /// Exactly this many bytes.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Everything until the server closes the connection.
    CloseDelimited,
}

/// A fully read response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub framing: BodyFraming,
    pub bytes: Bytes,
}

impl Body {
    pub fn empty(framing: BodyFraming) -> Self {
        Self {
            framing,
            bytes: Bytes::new(),
        }
    }
}

/// A final upstream response.
#[derive(Debug, Clone)]
pub struct Response {
    status_line: StatusLine,
    headers: Headers,
    body: Option<Body>,
    interim: Vec<StatusLine>,
}

impl Response {
    pub(crate) fn new(
        status_line: StatusLine,
        headers: Headers,
        body: Option<Body>,
        interim: Vec<StatusLine>,
    ) -> Self {
        Self {
            status_line,
            headers,
            body,
            interim,
        }
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.status_line
    }

    pub fn status(&self) -> StatusCode {
        self.status_line.status
    }

    pub fn version(&self) -> Version {
        self.status_line.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// `None` when no body read was attempted, which is the case for 101.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Informational responses discarded before this one, in arrival order.
    pub fn interim(&self) -> &[StatusLine] {
        &self.interim
    }
}
