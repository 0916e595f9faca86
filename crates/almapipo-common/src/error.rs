//! Error types shared across almapipo crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, PipoError>;

/// Main error type for the shared domain types
#[derive(Error, Debug)]
pub enum PipoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown action '{0}'. Expected one of GET, PUT, POST, DELETE")]
    InvalidAction(String),

    #[error("Unknown status '{0}'. Expected one of new, done, error")]
    InvalidStatus(String),

    #[error("Invalid record id '{0}'")]
    InvalidRecordId(String),

    #[error("Invalid job timestamp '{0}'. Expected RFC 3339, e.g. 2024-01-31T08:15:00.123456Z")]
    InvalidJob(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
