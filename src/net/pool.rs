//! Upstream connection pool.
//!
//! # Responsibilities
//! - Hand out idle connections per authority, or dial new ones
//! - Keep a ledger of leased connections
//! - Take connections back for reuse, or close them
//! - Forget a connection whose stream was handed off by an upgrade

use dashmap::DashMap;

use crate::config::{PoolConfig, TimeoutConfig};
use crate::http::disposition::Disposition;
use crate::http::error::TransportError;
use crate::net::connection::{ConnectionId, TransportConnection};
use crate::observability::metrics;

/// The connection-management side of an exchange.
///
/// After [`detach`](ConnectionManager::detach) the manager must never read,
/// write or close that connection again.
pub trait ConnectionManager: Send + Sync {
    /// Return a connection for reuse.
    fn release(&self, conn: TransportConnection);

    /// Close a connection that must not be reused.
    fn discard(&self, conn: TransportConnection);

    /// Forget a connection whose stream now belongs to someone else.
    /// Returns false if the connection was not leased from this manager.
    fn detach(&self, id: ConnectionId) -> bool;

    /// Apply a disposition decided for a finished exchange.
    fn settle(&self, disposition: Disposition) {
        metrics::record_disposition(&disposition);
        match disposition {
            Disposition::Reuse(conn) => self.release(conn),
            Disposition::Close { connection, .. } => self.discard(connection),
            Disposition::Upgraded { .. } => {}
        }
    }
}

/// Pool of upstream connections keyed by `host:port`.
#[derive(Debug)]
pub struct ConnectionPool {
    /// authority -> idle connections, most recently released last.
    idle: DashMap<String, Vec<TransportConnection>>,
    /// Connections currently out on an exchange.
    leased: DashMap<ConnectionId, String>,
    max_idle_per_authority: usize,
    timeouts: TimeoutConfig,
}

impl ConnectionPool {
    /// Create an empty pool.
    pub fn new(config: &PoolConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            idle: DashMap::new(),
            leased: DashMap::new(),
            max_idle_per_authority: config.max_idle_per_authority,
            timeouts,
        }
    }

    /// Lease a connection to `authority`, reusing an idle one when possible.
    pub async fn acquire(&self, authority: &str) -> Result<TransportConnection, TransportError> {
        let reused = self.idle.get_mut(authority).and_then(|mut conns| conns.pop());
        let conn = match reused {
            Some(conn) => {
                tracing::debug!(connection_id = %conn.id(), authority = %authority, "Reusing idle connection");
                conn
            }
            None => TransportConnection::connect(authority, &self.timeouts).await?,
        };
        self.lease(&conn);
        Ok(conn)
    }

    /// Record a connection opened elsewhere as leased from this pool.
    pub fn lease(&self, conn: &TransportConnection) {
        self.leased.insert(conn.id(), conn.authority().to_string());
    }

    /// Whether `id` is currently leased.
    pub fn is_leased(&self, id: ConnectionId) -> bool {
        self.leased.contains_key(&id)
    }

    /// Number of leased connections.
    pub fn leased_count(&self) -> usize {
        self.leased.len()
    }

    /// Number of idle connections for `authority`.
    pub fn idle_count(&self, authority: &str) -> usize {
        self.idle.get(authority).map(|conns| conns.len()).unwrap_or(0)
    }
}

impl ConnectionManager for ConnectionPool {
    fn release(&self, conn: TransportConnection) {
        if self.leased.remove(&conn.id()).is_none() {
            tracing::warn!(connection_id = %conn.id(), "Release of a connection this pool does not own; closing it");
            close_in_background(conn);
            return;
        }
        // Unsolicited bytes would be read as the next response.
        if conn.buffered() > 0 {
            tracing::debug!(connection_id = %conn.id(), buffered = conn.buffered(), "Stray bytes after response; closing");
            close_in_background(conn);
            return;
        }

        let mut idle = self.idle.entry(conn.authority().to_string()).or_default();
        if idle.len() >= self.max_idle_per_authority {
            drop(idle);
            close_in_background(conn);
            return;
        }
        tracing::trace!(connection_id = %conn.id(), "Connection returned to pool");
        idle.push(conn);
    }

    fn discard(&self, conn: TransportConnection) {
        self.leased.remove(&conn.id());
        close_in_background(conn);
    }

    fn detach(&self, id: ConnectionId) -> bool {
        let detached = self.leased.remove(&id).is_some();
        tracing::debug!(connection_id = %id, detached, "Connection detached from pool");
        detached
    }
}

/// Shut the connection down without blocking the caller.
fn close_in_background(conn: TransportConnection) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(conn.shutdown());
        }
        Err(_) => drop(conn),
    }
}
