//! Domain-level errors.
//!
//! These errors represent invalid input and corrupt data.
//! They are independent of infrastructure concerns (database, cache).

use thiserror::Error;

/// Domain-specific errors.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Validation failed for a key, scope or schema declaration
    #[error("Validation error: {0}")]
    Validation(String),

    /// A value could not be encoded, or stored bytes could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        DomainError::Serialization(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
