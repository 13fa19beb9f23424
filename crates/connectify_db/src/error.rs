//! Error types for the database client

use thiserror::Error;

/// Errors that can occur when working with the database client
#[derive(Debug, Error)]
pub enum DbError {
    /// Error from SQLx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Error with the database configuration
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Error with database URL parsing
    #[error("Database URL error: {0}")]
    UrlError(String),

    /// Error with database pool creation
    #[error("Database pool error: {0}")]
    PoolError(String),

    /// Error with database query
    #[error("Database query error: {0}")]
    QueryError(String),

    /// A stored value could not be mapped onto its model type
    #[error("Database decode error: {0}")]
    DecodeError(String),

    /// A requested state change is not allowed from the row's current state
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// The row addressed by an update does not exist
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// True for unique constraint violations, which callers may resolve by retrying.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::SqlxError(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            DbError::QueryError(message) => message.contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}
