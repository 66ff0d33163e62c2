//! Error types for search_core

use crate::DocId;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The storage collaborator failed to serve a lookup or write
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Document not found: {0}")]
    NotFound(DocId),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot encoding or decoding (bincode)
    #[error("Encode error: {0}")]
    Encode(#[from] bincode::Error),
}

impl Error {
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
