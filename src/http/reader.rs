//! Response reading state machine.
//!
//! # Flow
//! ```text
//! read head ──▶ 1xx (not 101)? ──yes──▶ log, discard, read next head
//!                    │ no
//!                    ▼
//!               101? ──yes──▶ done, no body (bytes belong to the new protocol)
//!                    │ no
//!                    ▼
//!               body via BodyStrategy
//! ```
//!
//! The interim loop is bounded both by count and by an overall head deadline,
//! so a peer streaming endless `102 Processing` cannot stall the exchange.

use std::time::Duration;

use http::Method;

use crate::config::{ClientConfig, ReadLimits, TimeoutConfig};
use crate::http::body::{BodyStrategy, FramedBody};
use crate::http::error::{ExchangeError, TransportError};
use crate::http::parse::parse_head;
use crate::http::response::{Headers, Response, StatusLine};
use crate::net::TransportConnection;
use crate::observability::metrics;

/// Reads one response from an upstream connection.
#[derive(Debug, Clone)]
pub struct ResponseReader<B = FramedBody> {
    limits: ReadLimits,
    head_deadline: Duration,
    body: B,
}

impl ResponseReader<FramedBody> {
    pub fn new(limits: ReadLimits, timeouts: &TimeoutConfig) -> Self {
        let body = FramedBody::new(limits.max_body_bytes);
        Self {
            limits,
            head_deadline: timeouts.response_head(),
            body,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.limits.clone(), &config.timeouts)
    }
}

impl<B: BodyStrategy> ResponseReader<B> {
    /// Swap the body-reading strategy.
    pub fn with_body_strategy<C: BodyStrategy>(self, body: C) -> ResponseReader<C> {
        ResponseReader {
            limits: self.limits,
            head_deadline: self.head_deadline,
            body,
        }
    }

    /// Read the response to a GET-like request.
    pub async fn read(&self, conn: &mut TransportConnection) -> Result<Response, ExchangeError> {
        self.read_for(conn, &Method::GET).await
    }

    /// Read the response to a request made with `method`.
    ///
    /// On error the connection is in an unknown state and must be discarded.
    pub async fn read_for(
        &self,
        conn: &mut TransportConnection,
        method: &Method,
    ) -> Result<Response, ExchangeError> {
        self.read_from(conn, method, None).await
    }

    /// Continue reading after a head that was already consumed, e.g. while
    /// waiting on `Expect: 100-continue` before sending a request body.
    ///
    /// An interim `head` is recorded and skipped like any other; a final one
    /// is used as-is and no further head is read.
    pub async fn read_after_head(
        &self,
        conn: &mut TransportConnection,
        method: &Method,
        status_line: StatusLine,
        headers: Headers,
    ) -> Result<Response, ExchangeError> {
        self.read_from(conn, method, Some((status_line, headers))).await
    }

    async fn read_from(
        &self,
        conn: &mut TransportConnection,
        method: &Method,
        pre_read: Option<(StatusLine, Headers)>,
    ) -> Result<Response, ExchangeError> {
        let (status_line, headers, interim) =
            match tokio::time::timeout(self.head_deadline, self.read_final_head(conn, pre_read)).await {
                Ok(head) => head?,
                Err(_) => return Err(TransportError::HeadDeadline(self.head_deadline).into()),
            };

        if status_line.is_switching_protocols() {
            tracing::debug!(
                connection_id = %conn.id(),
                pending = conn.buffered(),
                "Switch Protocols; not reading a body"
            );
            return Ok(Response::new(status_line, headers, None, interim));
        }

        let body = self.body.read_body(&status_line, &headers, method, conn).await?;
        Ok(Response::new(status_line, headers, Some(body), interim))
    }

    async fn read_final_head(
        &self,
        conn: &mut TransportConnection,
        mut pre_read: Option<(StatusLine, Headers)>,
    ) -> Result<(StatusLine, Headers, Vec<StatusLine>), ExchangeError> {
        let mut interim = Vec::new();
        loop {
            let (status_line, headers) = match pre_read.take() {
                Some(head) => head,
                None => {
                    let raw = conn.read_head(self.limits.max_head_bytes).await?;
                    parse_head(&raw, self.limits.max_headers)?
                }
            };
            if !status_line.is_interim() {
                return Ok((status_line, headers, interim));
            }

            tracing::info!(
                connection_id = %conn.id(),
                status_line = %status_line,
                "Discarding unexpected response"
            );
            metrics::record_interim_discarded(status_line.status);
            interim.push(status_line);

            if interim.len() > self.limits.max_interim_responses {
                return Err(TransportError::TooManyInterimResponses(self.limits.max_interim_responses).into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ProtocolError;
    use crate::http::response::BodyFraming;
    use crate::observability::logging::capture::CapturedLogs;
    use http::header::CONNECTION;
    use http::StatusCode;
    use tokio::io::AsyncWriteExt;

    fn reader() -> ResponseReader {
        ResponseReader::from_config(&ClientConfig::default())
    }

    fn scripted(bytes: &'static [u8]) -> TransportConnection {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = server.write_all(bytes).await;
        });
        TransportConnection::new(client, "test:80", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn interim_then_final() {
        let mut conn = scripted(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let response = reader().read(&mut conn).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.interim().len(), 1);
        assert_eq!(response.interim()[0].status, StatusCode::CONTINUE);
        assert_eq!(&response.body().unwrap().bytes[..], b"hello");
    }

    #[tokio::test]
    async fn interim_discard_is_logged_once() {
        let (logs, _guard) = CapturedLogs::install();
        let mut conn = scripted(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        reader().read(&mut conn).await.unwrap();

        let discards = logs.matching("Discarding unexpected response");
        assert_eq!(discards.len(), 1);
        assert!(discards[0].contains("INFO"));
        assert!(discards[0].contains("HTTP/1.1 100 Continue"));
    }

    #[tokio::test]
    async fn pre_read_interim_head_is_skipped() {
        let mut conn = scripted(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let continue_line = StatusLine {
            version: http::Version::HTTP_11,
            status: StatusCode::CONTINUE,
            reason: "Continue".into(),
        };
        let response = reader()
            .read_after_head(&mut conn, &Method::POST, continue_line.clone(), Headers::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.interim(), &[continue_line]);
        assert_eq!(&response.body().unwrap().bytes[..], b"ok");
    }

    #[tokio::test]
    async fn pre_read_final_head_is_not_read_again() {
        let mut conn = scripted(b"body");
        let final_line = StatusLine {
            version: http::Version::HTTP_11,
            status: StatusCode::EXPECTATION_FAILED,
            reason: "Expectation Failed".into(),
        };
        let mut headers = Headers::new();
        headers.push(http::header::CONTENT_LENGTH, http::header::HeaderValue::from_static("4"));

        let response = reader()
            .read_after_head(&mut conn, &Method::POST, final_line, headers)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
        assert!(response.interim().is_empty());
        assert_eq!(&response.body().unwrap().bytes[..], b"body");
    }

    #[tokio::test]
    async fn every_interim_code_is_discarded() {
        let mut conn = scripted(
            b"HTTP/1.1 100 Continue\r\n\r\n\
              HTTP/1.1 102 Processing\r\n\r\n\
              HTTP/1.1 103 Early Hints\r\nLink: </style.css>; rel=preload\r\n\r\n\
              HTTP/1.1 204 No Content\r\n\r\n",
        );
        let response = reader().read(&mut conn).await.unwrap();

        let codes: Vec<u16> = response.interim().iter().map(|l| l.status.as_u16()).collect();
        assert_eq!(codes, vec![100, 102, 103]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.body().unwrap().framing, BodyFraming::NoBody);
    }

    #[tokio::test]
    async fn switching_protocols_is_final_and_reads_no_body() {
        let mut conn = scripted(
            b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n\x81\x02hi",
        );
        let response = reader().read(&mut conn).await.unwrap();

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(response.body().is_none());
        assert!(response.interim().is_empty());
        assert_eq!(response.headers().first(&CONNECTION).unwrap(), "Upgrade");
    }

    #[tokio::test]
    async fn interim_before_switching_protocols() {
        let mut conn = scripted(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\n\r\n",
        );
        let response = reader().read(&mut conn).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.interim().len(), 1);
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let mut conn = scripted(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n");
        let response = reader().read_for(&mut conn, &Method::HEAD).await.unwrap();
        assert_eq!(response.body().unwrap().framing, BodyFraming::NoBody);
    }

    #[tokio::test]
    async fn endless_interim_responses_hit_the_count_limit() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            while server.write_all(b"HTTP/1.1 102 Processing\r\n\r\n").await.is_ok() {}
        });
        let mut conn = TransportConnection::new(client, "test:80", Duration::from_secs(1));

        let mut limits = ReadLimits::default();
        limits.max_interim_responses = 3;
        let err = ResponseReader::new(limits, &TimeoutConfig::default())
            .read(&mut conn)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Transport(TransportError::TooManyInterimResponses(3))
        ));
    }

    #[tokio::test]
    async fn slow_interim_drip_hits_the_head_deadline() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            loop {
                if server.write_all(b"HTTP/1.1 102 Processing\r\n\r\n").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        let mut conn = TransportConnection::new(client, "test:80", Duration::from_secs(1));

        let mut limits = ReadLimits::default();
        limits.max_interim_responses = usize::MAX;
        let timeouts = TimeoutConfig {
            response_head_ms: 200,
            ..TimeoutConfig::default()
        };
        let err = ResponseReader::new(limits, &timeouts).read(&mut conn).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Transport(TransportError::HeadDeadline(_))));
    }

    #[tokio::test]
    async fn malformed_status_line_is_a_protocol_error() {
        let mut conn = scripted(b"HTTP/1.1 OK\r\n\r\n");
        let err = reader().read(&mut conn).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Protocol(ProtocolError::MalformedHead(_))));
    }
}
