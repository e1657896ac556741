//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use intercept_client::config::ClientConfig;
use intercept_client::http::{ClientLeg, ResponseReader};
use intercept_client::net::ConnectionPool;

/// Start a mock upstream on an ephemeral port. `handler` runs once per
/// accepted connection.
pub async fn start_upstream<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(handler(socket));
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Mock upstream that answers every request on a connection with `reply`.
#[allow(dead_code)]
pub async fn start_scripted_upstream(reply: &'static [u8]) -> SocketAddr {
    start_upstream(move |mut socket| async move {
        while read_request_head(&mut socket).await.is_some() {
            if socket.write_all(reply).await.is_err() {
                break;
            }
        }
    })
    .await
}

/// Read one request head. `None` once the peer has closed.
pub async fn read_request_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => head.push(byte[0]),
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// A pool and client leg built from default configuration.
#[allow(dead_code)]
pub fn client() -> (Arc<ConnectionPool>, ClientLeg) {
    client_with(ClientConfig::default())
}

#[allow(dead_code)]
pub fn client_with(config: ClientConfig) -> (Arc<ConnectionPool>, ClientLeg) {
    let pool = Arc::new(ConnectionPool::new(&config.pool, config.timeouts.clone()));
    let leg = ClientLeg::new(ResponseReader::from_config(&config), pool.clone());
    (pool, leg)
}
