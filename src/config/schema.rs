//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the upstream client leg.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Bounds on what a response may contain.
    pub limits: ReadLimits,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Idle connection pool settings.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Limits applied while reading a response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadLimits {
    /// Informational (1xx, not 101) responses tolerated before the final one.
    pub max_interim_responses: usize,

    /// Largest accepted status line plus header block, in bytes.
    pub max_head_bytes: usize,

    /// Most header fields accepted in one response head.
    pub max_headers: usize,

    /// Largest body buffered for a final response, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_interim_responses: 16,
            max_head_bytes: 64 * 1024,
            max_headers: 100,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Timeout configuration for upstream I/O.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_ms: u64,

    /// Timeout for any single read or write, in milliseconds.
    pub read_ms: u64,

    /// Deadline for receiving the final response head, interim responses
    /// included, in milliseconds.
    pub response_head_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            read_ms: 30_000,
            response_head_ms: 60_000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn response_head(&self) -> Duration {
        Duration::from_millis(self.response_head_ms)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept per `host:port`.
    pub max_idle_per_authority: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_authority: 8,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
