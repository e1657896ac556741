//! Connection disposition after an exchange.
//!
//! # Responsibilities
//! - Decide whether an upstream connection is reused or closed
//! - On `101` + `Connection: upgrade`, hand the stream off and detach it
//!   from the connection manager as part of the same decision
//!
//! # Design Decisions
//! - The policy consumes the connection; only non-upgrade outcomes give it back
//! - A 101 without `Connection: upgrade` falls through to the normal
//!   HTTP/1.1 rules, status code ignored

use std::sync::Arc;

use http::header::{CONNECTION, UPGRADE};
use http::Version;

use crate::http::exchange::Exchange;
use crate::http::response::{BodyFraming, Response};
use crate::net::{ConnectionId, ConnectionManager, TransportConnection};
use crate::observability::metrics;

/// Why a connection cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// HTTP/1.0 without `Connection: keep-alive`.
    Http10,

    /// Server sent `Connection: close`.
    ServerConnectionClose,

    /// Response body is close delimited.
    ///
    /// The end of the body was the end of the stream.
    CloseDelimitedBody,
}

impl CloseReason {
    pub fn explain(&self) -> &'static str {
        match self {
            CloseReason::Http10 => "version is http1.0",
            CloseReason::ServerConnectionClose => "server sent Connection: close",
            CloseReason::CloseDelimitedBody => "response body is close delimited",
        }
    }
}

/// Outcome for the connection of a finished exchange.
#[derive(Debug)]
pub enum Disposition {
    /// Keep the connection open and return it for reuse.
    Reuse(TransportConnection),

    /// Close the connection.
    Close {
        connection: TransportConnection,
        reason: CloseReason,
    },

    /// The stream was handed off to the exchange and detached from the
    /// manager. Do not close, do not reuse.
    Upgraded { id: ConnectionId },
}

impl Disposition {
    /// Whether the connection stays open.
    pub fn keep_alive(&self) -> bool {
        !matches!(self, Disposition::Close { .. })
    }

    pub fn is_upgraded(&self) -> bool {
        matches!(self, Disposition::Upgraded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Reuse(_) => "reuse",
            Disposition::Close { .. } => "close",
            Disposition::Upgraded { .. } => "upgraded",
        }
    }
}

/// Standard HTTP/1.1 keep-alive rules, ignoring the status code.
///
/// `None` means the connection may be reused.
pub fn generic_close_reason(response: &Response) -> Option<CloseReason> {
    let headers = response.headers();
    if headers.has_token(&CONNECTION, "close") {
        return Some(CloseReason::ServerConnectionClose);
    }
    if response.version() == Version::HTTP_10 && !headers.has_token(&CONNECTION, "keep-alive") {
        return Some(CloseReason::Http10);
    }
    if response.body().map(|b| b.framing) == Some(BodyFraming::CloseDelimited) {
        return Some(CloseReason::CloseDelimitedBody);
    }
    None
}

/// Whether a `101` response confirms the upgrade.
///
/// Only the first `Connection` field is consulted, and its whole value must be
/// `upgrade` (any case).
fn confirms_upgrade(response: &Response) -> bool {
    response
        .headers()
        .first(&CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("upgrade"))
        .unwrap_or(false)
}

/// Decides what happens to an upstream connection after its response was read.
#[derive(Clone)]
pub struct ConnectionDispositionPolicy {
    manager: Arc<dyn ConnectionManager>,
}

impl std::fmt::Debug for ConnectionDispositionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDispositionPolicy").finish_non_exhaustive()
    }
}

impl ConnectionDispositionPolicy {
    pub fn new(manager: Arc<dyn ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Decide the connection's fate.
    ///
    /// For a confirmed upgrade the stream is stored in `exchange` and the
    /// connection is detached from the manager before this returns.
    pub fn decide(
        &self,
        exchange: &Exchange,
        response: &Response,
        connection: TransportConnection,
    ) -> Disposition {
        let generic = generic_close_reason(response);

        if response.status_line().is_switching_protocols() {
            if confirms_upgrade(response) {
                let id = connection.id();
                tracing::debug!(
                    connection_id = %id,
                    upgrade = ?response.headers().first(&UPGRADE),
                    pending = connection.buffered(),
                    "Got an upgrade response; handing off the channel and keeping the connection open"
                );
                exchange.hand_off(connection.into_upgraded());
                if !self.manager.detach(id) {
                    tracing::debug!(connection_id = %id, "Upgraded connection was not leased from the manager");
                }
                metrics::record_upgrade();
                return Disposition::Upgraded { id };
            }

            tracing::warn!(
                connection_id = %connection.id(),
                connection_header = ?response.headers().first(&CONNECTION),
                "101 Switching Protocols without Connection: upgrade; applying normal keep-alive rules"
            );
            metrics::record_ambiguous_upgrade();
        }

        match generic {
            Some(reason) => {
                tracing::debug!(connection_id = %connection.id(), reason = reason.explain(), "Closing upstream connection");
                Disposition::Close { connection, reason }
            }
            None => Disposition::Reuse(connection),
        }
    }
}
