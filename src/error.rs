//! Error types for entity invalidation
//!
//! The propagation path itself never fails: missing graph nodes resolve to
//! no relations and empty declarations are no-ops. Errors surface only at the
//! edges, while loading configuration, validating declarations, or wiring a
//! broadcast channel.

use thiserror::Error;

/// Main error type for the invalidation crate
#[derive(Error, Debug)]
pub enum InvalidationError {
    /// Configuration error (entity config or middleware config)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A mutation's affected-entities declaration has an unsupported shape
    #[error("Invalid affects declaration: {0}")]
    InvalidDeclaration(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Broadcast channel could not publish or register a receiver
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// I/O error while reading configuration files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for invalidation operations
pub type Result<T> = std::result::Result<T, InvalidationError>;

impl From<String> for InvalidationError {
    fn from(s: String) -> Self {
        InvalidationError::Other(s)
    }
}

impl From<&str> for InvalidationError {
    fn from(s: &str) -> Self {
        InvalidationError::Other(s.to_string())
    }
}
