//! Error types for the database adapter.
//!
//! This module defines the closed error taxonomy using `thiserror`. Every fault
//! raised by an engine is caught where the statement is issued and re-wrapped
//! into one of these kinds together with enough context (SQL text, parameters,
//! database name, timeout) to diagnose it without re-running the statement.

use crate::models::QueryParam;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration for '{field}': {message}")]
    Configuration { field: String, message: String },

    #[error("Database '{database}' is not configured (configured: {})", .configured.join(", "))]
    DatabaseNotFound {
        database: String,
        configured: Vec<String>,
    },

    #[error("Failed to open database '{database}' at {location}: {source}")]
    Connection {
        database: String,
        /// Credentials masked
        location: String,
        read_only: bool,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed on database '{database}': {source}")]
    Query {
        sql: String,
        params: Vec<QueryParam>,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query on database '{database}' exceeded {}ms", .timeout.as_millis())]
    QueryTimeout {
        sql: String,
        database: String,
        timeout: Duration,
    },

    #[error("Transaction {operation} failed on database '{database}': {source}")]
    Transaction {
        /// One of "begin", "commit", "rollback"
        operation: &'static str,
        database: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Discriminant of [`DbError`], for kind-specific retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    DatabaseNotFound,
    Connection,
    Query,
    QueryTimeout,
    Transaction,
}

impl DbError {
    /// Create a configuration error naming the offending field.
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a database not found error listing the configured names.
    pub fn database_not_found(database: impl Into<String>, configured: Vec<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
            configured,
        }
    }

    /// Create a connection error for an engine that could not be opened.
    pub fn connection(
        database: impl Into<String>,
        location: impl Into<String>,
        read_only: bool,
        source: sqlx::Error,
    ) -> Self {
        Self::Connection {
            database: database.into(),
            location: location.into(),
            read_only,
            source,
        }
    }

    /// Create a query error wrapping an engine fault.
    pub fn query(
        sql: impl Into<String>,
        params: &[QueryParam],
        database: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Query {
            sql: sql.into(),
            params: params.to_vec(),
            database: database.into(),
            source,
        }
    }

    /// Create a query timeout error.
    pub fn query_timeout(
        sql: impl Into<String>,
        database: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::QueryTimeout {
            sql: sql.into(),
            database: database.into(),
            timeout,
        }
    }

    /// Create a transaction error for a failed begin/commit/rollback.
    pub fn transaction(
        operation: &'static str,
        database: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Transaction {
            operation,
            database: database.into(),
            source,
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::DatabaseNotFound { .. } => ErrorKind::DatabaseNotFound,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Query { .. } => ErrorKind::Query,
            Self::QueryTimeout { .. } => ErrorKind::QueryTimeout,
            Self::Transaction { .. } => ErrorKind::Transaction,
        }
    }

    /// Name of the database the error refers to, if any.
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::DatabaseNotFound { database, .. }
            | Self::Connection { database, .. }
            | Self::Query { database, .. }
            | Self::QueryTimeout { database, .. }
            | Self::Transaction { database, .. } => Some(database),
        }
    }

    /// SQL text of the failed statement, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } | Self::QueryTimeout { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::QueryTimeout { .. })
    }
}

/// Result type alias for adapter operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_configuration_error_names_field() {
        let err = DbError::configuration("databases", "at least one database is required");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'databases'"));
        assert!(err.database().is_none());
    }

    #[test]
    fn test_database_not_found_lists_configured() {
        let err = DbError::database_not_found(
            "analytics",
            vec!["default".to_string(), "users".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("analytics"));
        assert!(msg.contains("default, users"));
        assert_eq!(err.database(), Some("analytics"));
    }

    #[test]
    fn test_query_error_keeps_context_and_cause() {
        let err = DbError::query(
            "SELECT * FROM missing",
            &[QueryParam::Int(1)],
            "default",
            sqlx::Error::RowNotFound,
        );
        assert_eq!(err.kind(), ErrorKind::Query);
        assert_eq!(err.sql(), Some("SELECT * FROM missing"));
        assert!(err.source().is_some());
        match err {
            DbError::Query { params, .. } => assert_eq!(params.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = DbError::query_timeout("SELECT 1", "default", Duration::from_millis(250));
        assert_eq!(err.to_string(), "Query on database 'default' exceeded 250ms");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_transaction_error_display() {
        let err = DbError::transaction("commit", "default", sqlx::Error::PoolClosed);
        assert!(err.to_string().starts_with("Transaction commit failed"));
        assert_eq!(err.kind(), ErrorKind::Transaction);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::query_timeout("SELECT 1", "db", Duration::from_secs(1)).is_retryable());
        assert!(
            DbError::connection("db", "/tmp/x.db", false, sqlx::Error::PoolTimedOut)
                .is_retryable()
        );
        assert!(!DbError::configuration("databases", "empty").is_retryable());
        assert!(
            !DbError::query("SELEC", &[], "db", sqlx::Error::RowNotFound).is_retryable()
        );
    }
}
