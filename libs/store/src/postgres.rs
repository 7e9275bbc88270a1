//! Postgres backend for the store facade.
//!
//! Snapshot transactions are opened as `REPEATABLE READ, READ ONLY`: under
//! the default `READ COMMITTED` level every statement takes a fresh
//! snapshot, which would let a page and its total count disagree.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::info;

use crate::error::DbError;
use crate::facade::{Db, Querier, SqlArg, Transaction};

const SNAPSHOT_ISOLATION: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/hub".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults.database_url.clone());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.min_connections);

        let acquire_timeout = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        Self {
            database_url,
            max_connections,
            min_connections,
            acquire_timeout,
            ..defaults
        }
    }
}

/// Postgres connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Create a new database connection pool.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    /// Create a pool that opens connections on first use.
    pub fn connect_lazy(config: &DbConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(0)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_lazy(&config.database_url)
            .map_err(DbError::Connect)?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Db for PgDatabase {
    type Conn = PgConn;
    type Tx = PgTx;

    async fn acquire(&self) -> Result<PgConn, DbError> {
        let conn = self.pool.acquire().await.map_err(DbError::from_acquire)?;
        Ok(PgConn(conn))
    }

    async fn begin(&self) -> Result<PgTx, DbError> {
        let tx = self.pool.begin().await.map_err(DbError::from_acquire)?;
        Ok(PgTx(tx))
    }

    async fn begin_snapshot(&self) -> Result<PgTx, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from_acquire)?;
        sqlx::query(SNAPSHOT_ISOLATION)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Transaction)?;
        Ok(PgTx(tx))
    }
}

/// Pooled autocommit connection.
pub struct PgConn(PoolConnection<Postgres>);

/// Open Postgres transaction.
pub struct PgTx(sqlx::Transaction<'static, Postgres>);

macro_rules! bind_args {
    ($query:expr, $args:expr) => {{
        let mut query = $query;
        for arg in $args {
            query = match arg {
                SqlArg::Null => query.bind(None::<String>),
                SqlArg::Bool(v) => query.bind(*v),
                SqlArg::Int(v) => query.bind(*v),
                SqlArg::Text(v) => query.bind(v.as_str()),
                SqlArg::Json(v) => query.bind(v),
                SqlArg::Uuid(v) => query.bind(*v),
            };
        }
        query
    }};
}

/// Implements [`Querier`] for a wrapper whose field derefs to `PgConnection`.
macro_rules! impl_querier {
    ($ty:ty) => {
        #[async_trait]
        impl Querier for $ty {
            async fn exec(&mut self, sql: &str, args: &[SqlArg]) -> Result<u64, sqlx::Error> {
                let result = bind_args!(sqlx::query(sql), args)
                    .execute(&mut *self.0)
                    .await?;
                Ok(result.rows_affected())
            }

            async fn query_count(&mut self, sql: &str, args: &[SqlArg]) -> Result<i64, sqlx::Error> {
                bind_args!(sqlx::query_scalar::<_, i64>(sql), args)
                    .fetch_one(&mut *self.0)
                    .await
            }

            async fn query_json(
                &mut self,
                sql: &str,
                args: &[SqlArg],
            ) -> Result<Vec<Value>, sqlx::Error> {
                bind_args!(sqlx::query_scalar::<_, Value>(sql), args)
                    .fetch_all(&mut *self.0)
                    .await
            }
        }
    };
}

impl_querier!(PgConn);
impl_querier!(PgTx);

#[async_trait]
impl Transaction for PgTx {
    async fn commit(self) -> Result<(), sqlx::Error> {
        self.0.commit().await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.0.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }
}
