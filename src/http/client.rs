//! One upstream exchange, start to finish.
//!
//! Composes the two halves explicitly:
//! ```text
//! write request head
//!     → ResponseReader::read_for        (interim loop, final head, body)
//!     → ConnectionDispositionPolicy      (reuse / close / upgrade handoff)
//!     → ConnectionManager::settle        (pool bookkeeping)
//! ```
//! Any failure before a disposition is reached discards the connection.

use std::sync::Arc;

use crate::http::body::{BodyStrategy, FramedBody};
use crate::http::disposition::ConnectionDispositionPolicy;
use crate::http::error::ExchangeError;
use crate::http::exchange::Exchange;
use crate::http::reader::ResponseReader;
use crate::http::request::RequestHead;
use crate::http::response::Response;
use crate::net::{ConnectionManager, TransportConnection, UpgradedChannel};

/// Result of a completed exchange.
#[derive(Debug)]
pub struct Outcome {
    pub response: Response,
    pub exchange: Exchange,
    /// False when the connection was closed after this exchange.
    pub keep_alive: bool,
}

impl Outcome {
    /// The handed-off channel, if the server switched protocols.
    pub fn upgraded_channel(&self) -> Option<&UpgradedChannel> {
        self.exchange.upgraded_channel()
    }
}

/// The server-facing half of a proxied request.
pub struct ClientLeg<B = FramedBody> {
    reader: ResponseReader<B>,
    policy: ConnectionDispositionPolicy,
    manager: Arc<dyn ConnectionManager>,
}

impl<B: BodyStrategy> ClientLeg<B> {
    pub fn new(reader: ResponseReader<B>, manager: Arc<dyn ConnectionManager>) -> Self {
        Self {
            reader,
            policy: ConnectionDispositionPolicy::new(manager.clone()),
            manager,
        }
    }

    /// Send `request` on `conn` and read its response.
    pub async fn execute(
        &self,
        mut conn: TransportConnection,
        request: &RequestHead,
    ) -> Result<Outcome, ExchangeError> {
        tracing::debug!(
            connection_id = %conn.id(),
            method = %request.method,
            target = %request.target,
            "Sending upstream request"
        );

        let sent = conn.write_all(&request.to_bytes()).await;
        if let Err(e) = sent {
            self.manager.discard(conn);
            return Err(e.into());
        }

        let read = self.reader.read_for(&mut conn, &request.method).await;
        let response = match read {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Exchange failed; discarding connection");
                self.manager.discard(conn);
                return Err(e);
            }
        };

        let exchange = Exchange::new();
        let disposition = self.policy.decide(&exchange, &response, conn);
        let keep_alive = disposition.keep_alive();
        self.manager.settle(disposition);

        Ok(Outcome {
            response,
            exchange,
            keep_alive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::net::ConnectionPool;
    use http::header::HeaderValue;
    use http::StatusCode;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn leg(pool: &Arc<ConnectionPool>) -> ClientLeg {
        let config = ClientConfig::default();
        ClientLeg::new(ResponseReader::from_config(&config), pool.clone())
    }

    fn pool() -> Arc<ConnectionPool> {
        let config = ClientConfig::default();
        Arc::new(ConnectionPool::new(&config.pool, config.timeouts))
    }

    /// Upstream that reads one request head and answers with `reply`.
    fn upstream(reply: &'static [u8]) -> TransportConnection {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(reply).await;
            // Hold the stream open so only framing ends the response.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        TransportConnection::new(client, "origin:80", Duration::from_secs(1))
    }

    fn request() -> RequestHead {
        RequestHead::get("/", HeaderValue::from_static("origin"))
    }

    #[tokio::test]
    async fn empty_ok_response_is_pooled() {
        let pool = pool();
        let conn = upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        pool.lease(&conn);
        let id = conn.id();

        let outcome = leg(&pool).execute(conn, &request()).await.unwrap();
        assert_eq!(outcome.response.status(), StatusCode::OK);
        assert!(outcome.response.body().unwrap().bytes.is_empty());
        assert!(outcome.keep_alive);
        assert!(outcome.upgraded_channel().is_none());
        assert_eq!(pool.idle_count("origin:80"), 1);

        let reused = pool.acquire("origin:80").await.unwrap();
        assert_eq!(reused.id(), id);
    }

    #[tokio::test]
    async fn upgrade_is_kept_out_of_the_pool() {
        let pool = pool();
        let conn = upstream(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n");
        pool.lease(&conn);

        let req = request().upgrade(HeaderValue::from_static("websocket"));
        let outcome = leg(&pool).execute(conn, &req).await.unwrap();
        assert!(outcome.keep_alive);
        assert!(outcome.upgraded_channel().is_some());
        assert_eq!(pool.leased_count(), 0);
        assert_eq!(pool.idle_count("origin:80"), 0);
    }

    #[tokio::test]
    async fn failed_read_discards_the_connection() {
        let pool = pool();
        let conn = upstream(b"garbage\r\n\r\n");
        pool.lease(&conn);

        let err = leg(&pool).execute(conn, &request()).await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(pool.leased_count(), 0);
        assert_eq!(pool.idle_count("origin:80"), 0);
    }
}
