//! Bounded connection pooling for Quarry.
//!
//! The pool hands out connections created by a user-supplied factory, capped
//! at a configured maximum. Acquisition blocks the calling thread on a
//! condition variable until a connection is returned or the acquire timeout
//! elapses; async work happens on the connection itself, never while holding
//! the pool lock.

use quarry_core::error::{Error, PoolError, Result};
use quarry_core::{Backend, Cx, Outcome, Row, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Maximum time to wait for a connection in milliseconds
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 30_000, // 30 seconds
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of active connections
    pub active_connections: usize,
}

struct PoolState<B> {
    idle: VecDeque<B>,
    total: usize,
    closed: bool,
}

struct PoolInner<B> {
    state: Mutex<PoolState<B>>,
    available: Condvar,
    factory: Box<dyn Fn() -> Result<B> + Send + Sync>,
    config: PoolConfig,
}

/// A bounded connection pool.
///
/// Cloning the pool is cheap; all clones share the same connections.
pub struct Pool<B> {
    inner: Arc<PoolInner<B>>,
}

impl<B> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> Pool<B> {
    /// Create a new pool around a connection factory.
    ///
    /// Connections are created lazily, up to `config.max_connections`.
    pub fn new<F>(config: PoolConfig, factory: F) -> Self
    where
        F: Fn() -> Result<B> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                factory: Box::new(factory),
                config,
            }),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a connection, blocking until one is available.
    ///
    /// Fails with a [`PoolError`] of kind `Timeout` when no connection
    /// becomes available within the acquire timeout, `Closed` after
    /// [`close`](Pool::close), and `Factory` when creating a fresh
    /// connection fails.
    pub fn acquire(&self) -> Result<PooledConnection<B>> {
        let timeout = Duration::from_millis(self.inner.config.acquire_timeout_ms);
        let deadline = Instant::now() + timeout;
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        loop {
            if state.closed {
                return Err(Error::ConnectionUnavailable(PoolError::closed(
                    "pool is closed",
                )));
            }

            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: Arc::clone(&self.inner),
                });
            }

            if state.total < self.inner.config.max_connections {
                state.total += 1;
                drop(state);
                // Factory runs outside the lock; other threads keep moving.
                match (self.inner.factory)() {
                    Ok(conn) => {
                        tracing::debug!(total = self.stats().total_connections, "opened connection");
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            pool: Arc::clone(&self.inner),
                        });
                    }
                    Err(e) => {
                        let mut state = self
                            .inner
                            .state
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        state.total -= 1;
                        self.inner.available.notify_one();
                        return Err(Error::ConnectionUnavailable(PoolError::factory(format!(
                            "connection factory failed: {e}"
                        ))));
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ConnectionUnavailable(PoolError::timeout(format!(
                    "no connection available within {}ms",
                    self.inner.config.acquire_timeout_ms
                ))));
            }
            let (guard, wait) = self
                .inner
                .available
                .wait_timeout(state, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state = guard;
            if wait.timed_out() && state.idle.is_empty() {
                return Err(Error::ConnectionUnavailable(PoolError::timeout(format!(
                    "no connection available within {}ms",
                    self.inner.config.acquire_timeout_ms
                ))));
            }
        }
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
        }
    }

    /// Close the pool, dropping idle connections.
    ///
    /// Outstanding connections are dropped as their guards go out of scope;
    /// subsequent acquires fail with a `Closed` pool error.
    pub fn close(&self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.closed = true;
        state.total -= state.idle.len();
        state.idle.clear();
        self.inner.available.notify_all();
    }

    /// Check if the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .closed
    }
}

/// A connection borrowed from the pool.
///
/// Dropping the guard returns the connection to the pool and wakes one
/// waiter.
pub struct PooledConnection<B> {
    conn: Option<B>,
    pool: Arc<PoolInner<B>>,
}

impl<B: std::fmt::Debug> std::fmt::Debug for PooledConnection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl<B> Deref for PooledConnection<B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<B> DerefMut for PooledConnection<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken")
    }
}

/// A pooled connection executes statements like the connection it wraps,
/// so stores can sit directly on a pool checkout.
impl<B: Backend> Backend for PooledConnection<B> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        (**self).query(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        (**self).execute(cx, sql, params)
    }

    fn execute_returning(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
        returning: &[String],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        (**self).execute_returning(cx, sql, params, returning)
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        (**self).ping(cx)
    }
}

impl<B> Drop for PooledConnection<B> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut state = self
                .pool
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.closed {
                state.total -= 1;
            } else {
                state.idle.push_back(conn);
            }
            self.pool.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::error::PoolErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeConn {
        id: usize,
    }

    fn counting_pool(max: usize, timeout_ms: u64) -> Pool<FakeConn> {
        let counter = AtomicUsize::new(0);
        Pool::new(
            PoolConfig::new(max).acquire_timeout(timeout_ms),
            move || {
                Ok(FakeConn {
                    id: counter.fetch_add(1, Ordering::SeqCst),
                })
            },
        )
    }

    fn pool_error_kind(err: &Error) -> Option<PoolErrorKind> {
        match err {
            Error::ConnectionUnavailable(p) => Some(p.kind),
            _ => None,
        }
    }

    #[test]
    fn acquire_creates_up_to_max() {
        let pool = counting_pool(2, 10);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(pool.stats().total_connections, 2);
        assert_eq!(pool.stats().active_connections, 2);
    }

    #[test]
    fn released_connection_is_reused() {
        let pool = counting_pool(1, 10);
        let first_id = {
            let conn = pool.acquire().unwrap();
            conn.id
        };
        let again = pool.acquire().unwrap();
        assert_eq!(again.id, first_id);
        assert_eq!(pool.stats().total_connections, 1);
    }

    #[test]
    fn exhausted_pool_times_out() {
        let pool = counting_pool(1, 20);
        let _held = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert_eq!(pool_error_kind(&err), Some(PoolErrorKind::Timeout));
    }

    #[test]
    fn waiter_wakes_when_connection_returns() {
        let pool = counting_pool(1, 5_000);
        let held = pool.acquire().unwrap();
        let contender = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.acquire().map(|c| c.id))
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(held);
        let id = contender.join().unwrap().unwrap();
        assert_eq!(id, 0);
    }

    #[test]
    fn factory_failure_releases_slot() {
        let pool: Pool<FakeConn> = Pool::new(PoolConfig::new(1).acquire_timeout(10), || {
            Err(Error::Custom("refused".to_string()))
        });
        let err = pool.acquire().unwrap_err();
        assert_eq!(pool_error_kind(&err), Some(PoolErrorKind::Factory));
        // The failed attempt must not leak the slot.
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[test]
    fn closed_pool_rejects_acquire() {
        let pool = counting_pool(2, 10);
        {
            let _conn = pool.acquire().unwrap();
        }
        pool.close();
        assert!(pool.is_closed());
        let err = pool.acquire().unwrap_err();
        assert_eq!(pool_error_kind(&err), Some(PoolErrorKind::Closed));
        assert_eq!(pool.stats().total_connections, 0);
    }
}
