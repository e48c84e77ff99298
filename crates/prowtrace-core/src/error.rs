//! Error types for trace reconstruction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Identifier errors
    #[error("Invalid identifier format: {0}")]
    InvalidFormat(String),

    #[error("Invalid hex in identifier: {0}")]
    InvalidHex(String),

    // Artifact errors
    #[error("Job has no {0} label")]
    MissingLabel(String),

    #[error("Artifact is missing required field: {0}")]
    MissingField(String),

    #[error("Timestamp overflow while scheduling {0}")]
    TimestampOverflow(String),

    // Infrastructure errors
    #[error("Secure random source failed: {0}")]
    Entropy(String),

    #[error("Context propagation failed: {0}")]
    Propagation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
