//! Server-facing HTTP/1.1 client leg for an intercepting proxy.
//!
//! Reads upstream responses, skips interim 1xx responses, and on
//! `101 Switching Protocols` hands the raw stream to the caller instead of
//! returning it to the pool.

pub mod config;
pub mod http;
pub mod net;
pub mod observability;

pub use crate::config::ClientConfig;
pub use crate::http::{ClientLeg, ConnectionDispositionPolicy, Exchange, ResponseReader};
pub use crate::net::{ConnectionPool, UpgradedChannel};
