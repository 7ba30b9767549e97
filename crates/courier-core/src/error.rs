//! Error types for Courier Core.

use thiserror::Error;

use crate::connect::ConnectError;
use crate::store::StoreError;

/// Core error type for Courier operations.
#[derive(Error, Debug)]
pub enum CourierError {
    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Connection-layer errors
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// A create request raced with one already in flight for the same number
    #[error("Session creation already in progress for {0}")]
    CreateInProgress(String),

    /// No live or durable session for the number
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Tenant number contained no digits after sanitization
    #[error("Invalid tenant number: {0:?}")]
    InvalidNumber(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;
