//! Error types for Agora.

use thiserror::Error;

use crate::photo::CompressionError;

/// Main error type for Agora operations.
#[derive(Error, Debug)]
pub enum AgoraError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image compression errors
    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Agora operations.
pub type Result<T> = std::result::Result<T, AgoraError>;
