//! Database error types.

use std::fmt;

use thiserror::Error;

/// Which half of a paginated query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// The windowed data query.
    Data,
    /// The unbounded count query.
    Count,
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPhase::Data => f.write_str("data"),
            QueryPhase::Count => f.write_str("count"),
        }
    }
}

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// No pooled connection could be acquired.
    #[error("no database connection available: {0}")]
    PoolExhausted(#[source] sqlx::Error),

    /// Failed to begin, configure, commit or roll back a transaction.
    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    /// One phase of a paginated query failed.
    #[error("{phase} query failed: {source}")]
    Query {
        phase: QueryPhase,
        #[source]
        source: sqlx::Error,
    },

    /// A standalone statement failed.
    #[error("statement failed: {0}")]
    Execute(#[source] sqlx::Error),
}

impl DbError {
    /// Map a failure to obtain a connection or open a transaction.
    pub fn from_acquire(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::PoolExhausted(err)
            }
            other => DbError::Transaction(other),
        }
    }

    /// Phase of a failed paginated query, if this is one.
    pub fn phase(&self) -> Option<QueryPhase> {
        match self {
            DbError::Query { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether the failed operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Connect(_) | DbError::PoolExhausted(_) => true,
            DbError::Transaction(e) | DbError::Execute(e) => is_transient(e),
            DbError::Query { source, .. } => is_transient(source),
        }
    }
}

/// Serialization failures and deadlocks abort a transaction without any
/// fault in the statement itself.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}
