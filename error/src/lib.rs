//! Common error types for the data access layer.
//!
//! Every repository failure carries the name of the repository that raised
//! it, so failures can be attributed when several repositories share a pool.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Executor operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadRow,
    ReadRows,
    WriteData,
    WriteDataAndReadRow,
    WriteDataAndReadRows,
    Join,
}

impl Operation {
    /// Label used in error messages and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadRow => "ReadRow",
            Operation::ReadRows => "readRows",
            Operation::WriteData => "writeData",
            Operation::WriteDataAndReadRow => "WriteDataAndReadRow",
            Operation::WriteDataAndReadRows => "WriteDataAndReadRows",
            Operation::Join => "Join",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    /// No connection could be obtained from the pool. Nothing is held.
    #[error("{repo}.{op} Acquire error: {source}")]
    Acquire {
        repo: String,
        op: Operation,
        #[source]
        source: sqlx::Error,
    },

    /// A connection was obtained but the statement failed. The connection
    /// has already been released when this is returned.
    #[error("{repo}.{op} Query error: {source}")]
    Query {
        repo: String,
        op: Operation,
        #[source]
        source: sqlx::Error,
    },

    #[error("{repo} row scan error: {source}")]
    Scan {
        repo: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{repo} rows scan error: {source}")]
    RowsScan {
        repo: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{repo} fragment render error: {source}")]
    Fragment {
        repo: String,
        #[source]
        source: FragmentError,
    },
}

impl RepoError {
    /// Name of the repository that raised the error.
    pub fn repo(&self) -> &str {
        match self {
            RepoError::Acquire { repo, .. }
            | RepoError::Query { repo, .. }
            | RepoError::Scan { repo, .. }
            | RepoError::RowsScan { repo, .. }
            | RepoError::Fragment { repo, .. } => repo,
        }
    }

    /// Operation label, when the error came from an executor call.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            RepoError::Acquire { op, .. } | RepoError::Query { op, .. } => Some(*op),
            RepoError::Fragment { .. } => Some(Operation::Join),
            RepoError::Scan { .. } | RepoError::RowsScan { .. } => None,
        }
    }

    /// True when a single-row scan found no row.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepoError::Scan {
                source: sqlx::Error::RowNotFound,
                ..
            }
        )
    }
}

/// Errors raised while rendering a SQL fragment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("placeholder count mismatch: expected {expected} arguments, got {actual}")]
    ArgumentMismatch { expected: usize, actual: usize },

    #[error("empty {0}")]
    Empty(&'static str),
}

/// Connection bootstrap errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&RepoError> for ErrorResponse {
    fn from(err: &RepoError) -> Self {
        let (code, message) = match err {
            RepoError::Acquire { .. } => ("DB_ACQUIRE_FAILED", "Database connection unavailable"),
            RepoError::Query { .. } => ("DB_QUERY_FAILED", "Database query failed"),
            _ if err.is_not_found() => ("DB_NOT_FOUND", "Record not found"),
            RepoError::Scan { .. } | RepoError::RowsScan { .. } => {
                ("DB_SCAN_FAILED", "Failed to decode database result")
            }
            RepoError::Fragment { .. } => ("DB_INVALID_QUERY", "Invalid query fragment"),
        };
        Self::new(code, message).with_details(err.repo())
    }
}

impl From<RepoError> for ErrorResponse {
    fn from(err: RepoError) -> Self {
        Self::from(&err)
    }
}

impl From<DatabaseError> for ErrorResponse {
    fn from(err: DatabaseError) -> Self {
        let (code, message) = match &err {
            DatabaseError::ConnectionFailed(_) => ("DB_CONNECTION_FAILED", "Database connection failed"),
            DatabaseError::InvalidConfig(_) => ("DB_INVALID_CONFIG", "Invalid database configuration"),
            DatabaseError::InvalidLogLevel(_) => ("DB_INVALID_LOG_LEVEL", "Invalid database log level"),
            DatabaseError::QueryFailed(_) => ("DB_QUERY_FAILED", "Database query failed"),
        };
        Self::new(code, message)
    }
}

/// Result type alias using RepoError.
pub type Result<T> = std::result::Result<T, RepoError>;
