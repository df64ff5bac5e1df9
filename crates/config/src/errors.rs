//! Configuration error types.

use thiserror::Error;

/// Errors raised while parsing or validating agent configuration.
///
/// All of these are surfaced before the agent performs any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Requested certificate validity is not one of the allowed values.
    #[error("invalid value for ttl: {0} (allowed: 7, 30, 90 days)")]
    InvalidValidity(u32),

    /// A duration string could not be parsed.
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// A field-level constraint failed.
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A cross-field constraint failed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
