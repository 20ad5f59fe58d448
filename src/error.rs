//! Error types for gatehouse.

use thiserror::Error;

/// Common error type for gatehouse.
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// Database error.
    ///
    /// Generic database error wrapping failures from the backing store.
    /// Errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for GatehouseError {
    fn from(e: sqlx::Error) -> Self {
        GatehouseError::Database(e.to_string())
    }
}

/// Result type alias for gatehouse operations.
pub type Result<T> = std::result::Result<T, GatehouseError>;
