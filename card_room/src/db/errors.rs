//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data that cannot be interpreted
    #[error("malformed stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Client-safe message; SQL details never leave the process.
    pub fn client_message(&self) -> String {
        "internal server error".to_string()
    }
}

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;
