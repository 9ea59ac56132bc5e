//! Error types for the metrics store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid storage config: {0}")]
    Config(String),

    #[error("database connection error: {0}")]
    Connect(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("error marshaling labels: {0}")]
    Serialize(String),

    #[error("store is closed")]
    Closed,
}
