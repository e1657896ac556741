//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::ClientConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut positive = |field: &'static str, value: u64| {
        if value == 0 {
            errors.push(ValidationError {
                field,
                message: "must be greater than zero".to_string(),
            });
        }
    };

    positive("limits.max_interim_responses", config.limits.max_interim_responses as u64);
    positive("limits.max_head_bytes", config.limits.max_head_bytes as u64);
    positive("limits.max_headers", config.limits.max_headers as u64);
    positive("limits.max_body_bytes", config.limits.max_body_bytes as u64);
    positive("timeouts.connect_ms", config.timeouts.connect_ms);
    positive("timeouts.read_ms", config.timeouts.read_ms);
    positive("timeouts.response_head_ms", config.timeouts.response_head_ms);

    if config.timeouts.response_head_ms < config.timeouts.read_ms {
        errors.push(ValidationError {
            field: "timeouts.response_head_ms",
            message: "must not be shorter than timeouts.read_ms".to_string(),
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError {
            field: "observability.log_level",
            message: format!("unknown level '{}'", config.observability.log_level),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
