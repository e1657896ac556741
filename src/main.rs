//! Upgrade probe.
//!
//! Sends a single request upstream through the client leg and reports what
//! happened to the connection: reused, closed, or handed off after
//! `101 Switching Protocols`. With `--websocket` the handed-off channel is
//! given to a WebSocket client and one text message is exchanged over it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use intercept_client::config::{load_config, ClientConfig};
use intercept_client::http::{ClientLeg, RequestHead, ResponseReader};
use intercept_client::net::{ConnectionPool, UpgradedChannel};
use intercept_client::observability::logging;

#[derive(Parser)]
#[command(name = "upgrade-probe")]
#[command(about = "Send one request upstream and report the connection's disposition", long_about = None)]
struct Cli {
    /// Target URL (http:// or ws://)
    url: Url,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request a WebSocket upgrade
    #[arg(long)]
    websocket: bool,

    /// Text message sent over an upgraded WebSocket
    #[arg(short, long, default_value = "hello")]
    message: String,

    /// Extra request header, `Name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    logging::init(&config.observability.log_level);

    let (authority, host) = authority_of(&cli.url)?;
    let websocket = cli.websocket || cli.url.scheme() == "ws";

    let mut target = cli.url.path().to_string();
    if let Some(query) = cli.url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut request = RequestHead::get(target, HeaderValue::from_str(&host)?);
    if websocket {
        request = request
            .upgrade(HeaderValue::from_static("websocket"))
            .header(HeaderName::from_static("sec-websocket-version"), HeaderValue::from_static("13"))
            .header(HeaderName::from_static("sec-websocket-key"), HeaderValue::from_str(&generate_key())?);
    }
    for raw in &cli.headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("header {raw:?} is not `Name: value`"))?;
        request = request.header(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }

    let pool = Arc::new(ConnectionPool::new(&config.pool, config.timeouts.clone()));
    let leg = ClientLeg::new(ResponseReader::from_config(&config), pool.clone());

    let conn = pool.acquire(&authority).await?;
    tracing::info!(connection_id = %conn.id(), authority = %authority, "Connected");
    let outcome = leg.execute(conn, &request).await?;

    let response = &outcome.response;
    for interim in response.interim() {
        println!("(discarded) {}", interim);
    }
    println!("{}", response.status_line());
    for h in response.headers().iter() {
        println!("{}: {}", h.name, String::from_utf8_lossy(h.value.as_bytes()));
    }
    println!();
    println!("keep-alive: {}", outcome.keep_alive);

    if let Some(body) = response.body() {
        println!("body ({:?}, {} bytes)", body.framing, body.bytes.len());
        println!("{}", String::from_utf8_lossy(&body.bytes));
    }

    match outcome.exchange.into_upgraded_channel() {
        Some(channel) if websocket => websocket_echo(channel, &cli.message).await?,
        Some(channel) => {
            println!(
                "upgraded channel {} ({} bytes already received)",
                channel.id(),
                channel.pending().len()
            );
        }
        None => {}
    }

    Ok(())
}

/// `host:port` to dial and the `Host` header value.
fn authority_of(url: &Url) -> Result<(String, String), Box<dyn std::error::Error>> {
    match url.scheme() {
        "http" | "ws" => {}
        other => return Err(format!("unsupported scheme {other:?}; TLS is handled elsewhere").into()),
    }
    let host = url.host_str().ok_or("URL has no host")?;
    let port = url.port_or_known_default().ok_or("URL has no port")?;
    let host_header = match url.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    };
    Ok((format!("{host}:{port}"), host_header))
}

/// Speak WebSocket over the handed-off channel: send one message, print the reply.
async fn websocket_echo(channel: UpgradedChannel, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = WebSocketStream::from_raw_socket(channel, Role::Client, None).await;

    ws.send(Message::text(message)).await?;
    println!("> {message}");

    if let Some(reply) = ws.next().await {
        println!("< {}", reply?);
    }
    ws.close(None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_uses_known_default_ports() {
        let url = Url::parse("ws://example.com/chat").unwrap();
        let (authority, host) = authority_of(&url).unwrap();
        assert_eq!(authority, "example.com:80");
        assert_eq!(host, "example.com");

        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(authority_of(&url).unwrap(), ("127.0.0.1:8080".into(), "127.0.0.1:8080".into()));
    }

    #[test]
    fn tls_schemes_are_rejected() {
        assert!(authority_of(&Url::parse("https://example.com/").unwrap()).is_err());
    }
}
