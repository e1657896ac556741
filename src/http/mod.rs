//! HTTP protocol handling for the server-facing leg.
//!
//! # Data Flow
//! ```text
//! TransportConnection
//!     → reader.rs (status line + headers, interim loop, body via body.rs)
//!     → Response
//!     → disposition.rs (reuse / close / upgrade handoff into exchange.rs)
//!     → ConnectionManager
//!
//! client.rs wires the steps together for one request.
//! ```
//!
//! # Design Decisions
//! - 101 ends the interim loop and is never followed by a body read
//! - Channel handoff and pool detachment happen inside the disposition decision
//! - No retries at this layer

pub mod body;
pub mod client;
pub mod disposition;
pub mod error;
pub mod exchange;
pub mod parse;
pub mod reader;
pub mod request;
pub mod response;

pub use body::{BodyStrategy, FramedBody};
pub use client::{ClientLeg, Outcome};
pub use disposition::{CloseReason, ConnectionDispositionPolicy, Disposition};
pub use error::{ExchangeError, ProtocolError, TransportError};
pub use exchange::Exchange;
pub use reader::ResponseReader;
pub use request::RequestHead;
pub use response::{Body, BodyFraming, Header, Headers, Response, StatusLine};
