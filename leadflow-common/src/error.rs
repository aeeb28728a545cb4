//! Common error types for leadflow

use thiserror::Error;

/// Common result type for leadflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across leadflow crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record source (table, remote API) could not be read
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Remote data API returned an error or could not be reached
    #[error("HTTP error: {0}")]
    Http(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying database error reports a missing column.
    ///
    /// Used to detect older provider schemas without failing the whole poll.
    pub fn is_missing_column(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(e) => e.to_string().contains("no such column"),
            _ => false,
        }
    }

    /// True when the underlying database error reports a missing table.
    pub fn is_missing_table(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(e) => e.to_string().contains("no such table"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::SourceUnavailable("meetings".to_string());
        assert_eq!(err.to_string(), "Source unavailable: meetings");
    }

    #[test]
    fn test_non_database_errors_are_not_schema_errors() {
        let err = Error::Internal("no such column: person_phone".to_string());
        assert!(!err.is_missing_column());
        assert!(!err.is_missing_table());
    }
}
