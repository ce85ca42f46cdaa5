//! Backend execution trait.
//!
//! A [`Backend`] is a single logical database connection capable of executing
//! parameterized SQL. All operations are async and take a `Cx` context from
//! asupersync for cancellation/timeout support. Transaction demarcation
//! (BEGIN/COMMIT/ROLLBACK) goes through [`Backend::execute`] like any other
//! statement; nesting and rollback-only bookkeeping live a layer above.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A database connection capable of executing parameterized statements.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
/// Placeholder syntax in `sql` is dialect-specific and produced by the
/// statement compiler; backends execute what they are given.
pub trait Backend: Send + Sync {
    /// Execute a query and return all result rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            match self.query(cx, sql, params).await {
                Outcome::Ok(rows) => Outcome::Ok(rows.into_iter().next()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL) and return the
    /// number of rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute an INSERT and return rows holding the backend-generated key
    /// values named by `returning`, one row per inserted row.
    ///
    /// Backends with native RETURNING support append it to the statement;
    /// others read the last inserted row id after execution.
    fn execute_returning(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
        returning: &[String],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Check that the connection is still usable.
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
