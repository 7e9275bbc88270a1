//! Store connection facade.
//!
//! The paginated query executor depends only on these traits, so any
//! relational backend (or a test double) that can acquire a connection,
//! open a transaction and run statements is interchangeable with Postgres.
//!
//! Connections and transactions are guards: dropping one returns it to its
//! pool, and dropping an uncommitted transaction rolls it back. This is what
//! releases resources when a caller's future is cancelled.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::DbError;

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    /// SQL `NULL`, sent as a `text` parameter. Compare it against other
    /// column types through an explicit cast, e.g. `$1::int`.
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Json(Value),
    Uuid(Uuid),
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        SqlArg::Bool(v)
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<Value> for SqlArg {
    fn from(v: Value) -> Self {
        SqlArg::Json(v)
    }
}

impl From<Uuid> for SqlArg {
    fn from(v: Uuid) -> Self {
        SqlArg::Uuid(v)
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlArg::Null, Into::into)
    }
}

/// A SQL statement with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonQuery {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl JsonQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Append a bind parameter.
    pub fn bind(mut self, arg: impl Into<SqlArg>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Something statements can run on: a pooled connection or a transaction.
#[async_trait]
pub trait Querier: Send {
    /// Run a statement, returning the number of rows affected.
    async fn exec(&mut self, sql: &str, args: &[SqlArg]) -> Result<u64, sqlx::Error>;

    /// Run a query returning a single row with a single integer column.
    async fn query_count(&mut self, sql: &str, args: &[SqlArg]) -> Result<i64, sqlx::Error>;

    /// Run a query whose rows each carry one JSON column, in store order.
    async fn query_json(&mut self, sql: &str, args: &[SqlArg]) -> Result<Vec<Value>, sqlx::Error>;
}

/// An open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait Transaction: Querier {
    async fn commit(self) -> Result<(), sqlx::Error>;

    async fn rollback(self) -> Result<(), sqlx::Error>;
}

/// A source of connections and transactions.
#[async_trait]
pub trait Db: Send + Sync {
    type Conn: Querier;
    type Tx: Transaction;

    /// Acquire an autocommit connection.
    async fn acquire(&self) -> Result<Self::Conn, DbError>;

    /// Acquire a connection and begin a read-write transaction on it.
    async fn begin(&self) -> Result<Self::Tx, DbError>;

    /// Acquire a connection and begin a read-only transaction in which every
    /// statement observes the same snapshot.
    async fn begin_snapshot(&self) -> Result<Self::Tx, DbError>;
}
