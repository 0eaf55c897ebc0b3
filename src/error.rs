//! Error types for the Turnstile service.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a storage backend.
///
/// The decision engine returns these verbatim; a caller receiving one cannot
/// tell whether the request should have been admitted and must deny it.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connectivity or command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend did not answer within the configured deadline
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend was closed
    #[error("Storage backend is closed")]
    Closed,
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
