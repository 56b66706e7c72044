//! Error types for chat-relay

use thiserror::Error;

/// Main error type for relay startup and configuration
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors (bad file, bad URL, bad listen address)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
