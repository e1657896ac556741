//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reader / disposition / pool produce:
//!     → tracing events (interim discards at info, upgrade handoff at debug,
//!       ambiguous upgrades at warn)
//!     → metrics.rs (counters)
//!
//! logging.rs installs the subscriber for the binary.
//! ```

pub mod logging;
pub mod metrics;
