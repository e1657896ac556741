//! Minimal request head for driving an exchange.
//!
//! Header rewriting and routing belong to the proxy layer; this only puts a
//! request line and fields on the wire.

use http::header::{HeaderName, HeaderValue, CONNECTION, HOST, UPGRADE};
use http::Method;

use crate::http::response::Headers;

/// Request line and header fields, in the order they will be written.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub headers: Headers,
}

impl RequestHead {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Headers::new(),
        }
    }

    /// `GET target` with a `Host` field.
    pub fn get(target: impl Into<String>, host: HeaderValue) -> Self {
        Self::new(Method::GET, target).header(HOST, host)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Ask the server to switch to `protocol` (`Connection: Upgrade`, `Upgrade: protocol`).
    pub fn upgrade(self, protocol: HeaderValue) -> Self {
        self.header(CONNECTION, HeaderValue::from_static("Upgrade"))
            .header(UPGRADE, protocol)
    }

    /// Serialize as an HTTP/1.1 request head.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.target.as_bytes());
        buf.extend_from_slice(b" HTTP/1.1\r\n");

        for h in self.headers.iter() {
            buf.extend_from_slice(h.name.as_str().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(h.value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }
}
