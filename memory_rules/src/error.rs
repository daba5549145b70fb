//! Errors raised while validating memory policy configuration.

use thiserror::Error;

/// Result type alias for policy construction.
pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

/// Errors produced by the memory policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
}

impl PolicyError {
    /// Create an invalid configuration error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}
