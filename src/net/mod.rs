//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionPool::acquire
//!     → pool.rs (idle reuse or new TCP connect)
//!     → connection.rs (buffered, time-bounded reads and writes)
//!     → exchange runs over the connection
//!     → ConnectionManager::settle
//!         Reuse    → back to the idle list
//!         Close    → shut down
//!         Upgraded → already detached; stream lives on in upgraded.rs
//! ```
//!
//! # Design Decisions
//! - Every read and write carries a deadline
//! - Ownership of the stream is moved, never shared, so a detached
//!   connection cannot be touched by the pool again

pub mod connection;
pub mod pool;
pub mod upgraded;

pub use connection::{ConnectionId, Transport, TransportConnection};
pub use pool::{ConnectionManager, ConnectionPool};
pub use upgraded::UpgradedChannel;
