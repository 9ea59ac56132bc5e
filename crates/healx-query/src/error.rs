//! Error types for backend queries.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    /// A backend setting other than the URL is unusable.
    #[error("invalid backend config: {0}")]
    Config(String),

    #[error("invalid query range: {0}")]
    InvalidRange(String),

    #[error("error querying prometheus: {0}")]
    Transport(String),

    #[error("prometheus returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("prometheus error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("failed to decode prometheus response: {0}")]
    Decode(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered, but with zero points or the wrong result shape.
    #[error("no data found")]
    NoData,
}

impl QueryError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, QueryError::NoData)
    }
}
