//! Paginated JSON queries.
//!
//! A page of rows and the total number of matching rows are read inside one
//! snapshot transaction, so the count always describes the same data the
//! page was cut from, even while other sessions are writing.
//!
//! The executor never rewrites SQL. The data query receives the caller's
//! arguments followed by `limit` and `offset`, so a query with `n` arguments
//! ends in `LIMIT $n+1 OFFSET $n+2` and selects a single JSON column. The
//! count query receives only the caller's arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DbError, QueryPhase};
use crate::facade::{Db, JsonQuery, Querier, SqlArg, Transaction};

/// Window of results to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of rows; 0 asks for the count only.
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

/// Rows of a paginated query plus the unwindowed match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonQueryResult {
    pub data: Vec<Value>,
    pub total_count: u64,
}

/// Runs paginated queries against a [`Db`].
#[derive(Clone)]
pub struct QueryExecutor<D> {
    db: D,
}

impl<D: Db> QueryExecutor<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    /// Run `query` windowed by `pagination` and `count_query` unbounded in
    /// one snapshot transaction.
    ///
    /// All or nothing: on any error the transaction is rolled back and no
    /// rows are returned. If no connection can be acquired the error is
    /// [`DbError::PoolExhausted`] and neither query runs.
    pub async fn run_paginated_query(
        &self,
        query: &JsonQuery,
        count_query: &JsonQuery,
        pagination: Pagination,
    ) -> Result<JsonQueryResult, DbError> {
        let mut tx = self.db.begin_snapshot().await?;

        match paginate_in(&mut tx, query, count_query, pagination).await {
            Ok(result) => {
                tx.commit().await.map_err(DbError::Transaction)?;
                Ok(result)
            }
            Err(err) => {
                // A failed rollback still releases the connection when `tx`
                // drops; the query error is what the caller gets.
                if let Err(rollback) = tx.rollback().await {
                    debug!(error = %rollback, query_error = %err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Run both phases on a caller-owned connection or transaction.
///
/// Nothing is committed. Consistency between page and count is only
/// guaranteed when `querier` is a snapshot transaction.
pub async fn paginate_in<Q>(
    querier: &mut Q,
    query: &JsonQuery,
    count_query: &JsonQuery,
    pagination: Pagination,
) -> Result<JsonQueryResult, DbError>
where
    Q: Querier + ?Sized,
{
    let mut data_args = Vec::with_capacity(query.args.len() + 2);
    data_args.extend_from_slice(&query.args);
    data_args.push(SqlArg::Int(i64::from(pagination.limit)));
    data_args.push(SqlArg::Int(i64::from(pagination.offset)));

    let data = querier
        .query_json(&query.sql, &data_args)
        .await
        .map_err(|source| DbError::Query {
            phase: QueryPhase::Data,
            source,
        })?;

    let total = querier
        .query_count(&count_query.sql, &count_query.args)
        .await
        .map_err(|source| DbError::Query {
            phase: QueryPhase::Count,
            source,
        })?;

    let total_count = u64::try_from(total).map_err(|_| DbError::Query {
        phase: QueryPhase::Count,
        source: sqlx::Error::Decode(format!("negative row count {total}").into()),
    })?;

    debug!(
        rows = data.len(),
        total_count,
        limit = pagination.limit,
        offset = pagination.offset,
        "Paginated query complete"
    );

    Ok(JsonQueryResult { data, total_count })
}
