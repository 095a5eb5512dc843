use thiserror::Error;

/// Classifies feed acquisition errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Registry answered with a non-success HTTP status
    HttpStatus,
    /// Transport-level failure (DNS, TCP, TLS)
    Transport,
    /// Response body could not be read or decoded
    InvalidData,
}

/// PAC generator error types
#[derive(Error, Debug)]
pub enum PacError {
    #[error("Malformed feed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Feed error: {message}")]
    FeedError {
        kind: FeedErrorKind,
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PacError>;
