//! # arthub-store
//!
//! Database layer for listing endpoints.
//!
//! This crate provides:
//! - The store connection facade (`Db`, `Querier`, `Transaction`)
//! - A Postgres implementation of it on SQLx
//! - The paginated JSON query executor, which returns a page of rows and
//!   the total match count from a single snapshot

mod error;
mod facade;
mod paginate;
mod postgres;

pub use error::{DbError, QueryPhase};
pub use facade::{Db, JsonQuery, Querier, SqlArg, Transaction};
pub use paginate::{paginate_in, JsonQueryResult, Pagination, QueryExecutor};
pub use postgres::{DbConfig, PgConn, PgDatabase, PgTx};
