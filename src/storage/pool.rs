//! Bounded connection pool.
//!
//! One pool exists per mount. It owns every backend session handle and lends
//! them to adapters for the duration of a single operation:
//!
//! ```text
//! acquire ──► idle connection available? ──yes──► hand out
//!                      │ no
//!                      ▼
//!              live < max_connections? ──yes──► create (outside the lock)
//!                      │ no
//!                      ▼
//!              wait until a connection is released
//! ```
//!
//! Live connections (`idle + outstanding + creating`) never exceed
//! `max_connections`. A failed creation releases its reserved slot and wakes
//! one waiter. After [`close`](ConnectionPool::close) every idle connection is
//! closed immediately and every outstanding one as soon as it comes back.

use crate::config::PoolConfig;
use crate::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

/// Creates and closes backend sessions for a [`ConnectionPool`].
///
/// `create_connection` is the single extension point of a backend. It performs
/// the full session setup, including any authentication challenge/response,
/// and reports failures as normalized [`Error`]s.
pub trait ConnectionFactory: Send + Sync {
    /// The backend session handle.
    type Connection: Send;

    /// Backend name used in errors, logs and metric labels.
    fn backend(&self) -> &'static str;

    /// Establishes a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] or [`Error::Authentication`] when the
    /// session cannot be established.
    fn create_connection(&self) -> Result<Self::Connection>;

    /// Closes a session. The default simply drops it.
    fn close_connection(&self, connection: Self::Connection) {
        drop(connection);
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured capacity.
    pub max_connections: usize,
    /// Connections waiting in the idle set.
    pub idle: usize,
    /// Connections currently lent out.
    pub outstanding: usize,
    /// Total connections created over the pool's lifetime.
    pub created: usize,
    /// Whether the pool has been closed.
    pub closed: bool,
}

/// Type-erased teardown handle, held by a [`Mount`](crate::storage::Mount).
pub trait PoolControl: Send + Sync {
    /// Closes the pool. See [`ConnectionPool::close`].
    fn close(&self);

    /// Returns the current occupancy.
    fn status(&self) -> PoolStatus;
}

struct PoolState<C> {
    idle: Vec<C>,
    outstanding: usize,
    creating: usize,
    created: usize,
    closed: bool,
}

impl<C> PoolState<C> {
    fn live(&self) -> usize {
        self.idle.len() + self.outstanding + self.creating
    }
}

/// Acquires the state mutex, recovering from poisoning.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Connection pool mutex was poisoned, recovering");
            metrics::counter!("connection_pool_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Generic bounded pool over a [`ConnectionFactory`].
///
/// Construction performs no I/O; connections are created lazily on the first
/// [`acquire`](Self::acquire) that finds the idle set empty.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Connection>>,
    released: Condvar,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Creates a pool. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let config = PoolConfig {
            max_connections: config.max_connections.max(1),
            ..config
        };
        tracing::info!(
            backend = factory.backend(),
            max_connections = config.max_connections,
            "Created connection pool"
        );
        Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                outstanding: 0,
                creating: 0,
                created: 0,
                closed: false,
            }),
            released: Condvar::new(),
        }
    }

    /// Returns the factory.
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the effective configuration.
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn closed_error(&self) -> Error {
        Error::Connection {
            backend: self.factory.backend().to_string(),
            cause: "connection pool is closed".to_string(),
        }
    }

    /// Borrows a connection, creating or waiting for one as needed.
    ///
    /// Blocks while the pool is at capacity with no idle connection, for at
    /// most the configured acquire timeout (forever when none is set).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the pool is closed or the wait timed
    /// out, and any error of [`ConnectionFactory::create_connection`].
    pub fn acquire(&self) -> Result<PooledConnection<'_, F>> {
        let deadline = self.config.acquire_timeout.map(|t| Instant::now() + t);
        let mut state = acquire_lock(&self.state);
        let mut waited = false;

        loop {
            if state.closed {
                return Err(self.closed_error());
            }

            if let Some(connection) = state.idle.pop() {
                state.outstanding += 1;
                let idle = state.idle.len();
                drop(state);
                metrics::gauge!("connection_pool_idle", "backend" => self.factory.backend())
                    .set(idle as f64);
                tracing::debug!(backend = self.factory.backend(), "Acquired idle connection");
                return Ok(PooledConnection::new(self, connection));
            }

            if state.live() < self.config.max_connections {
                state.creating += 1;
                drop(state);
                return self.create();
            }

            if !waited {
                waited = true;
                metrics::counter!("connection_pool_waits_total", "backend" => self.factory.backend())
                    .increment(1);
                tracing::debug!(
                    backend = self.factory.backend(),
                    max_connections = self.config.max_connections,
                    "Pool exhausted, waiting for a connection"
                );
            }

            state = match deadline {
                None => self.wait(state),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Connection {
                            backend: self.factory.backend().to_string(),
                            cause: format!(
                                "timed out waiting for a connection ({} in use)",
                                state.outstanding + state.creating
                            ),
                        });
                    }
                    self.wait_timeout(state, deadline - now)
                },
            };
        }
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, PoolState<F::Connection>>,
    ) -> MutexGuard<'a, PoolState<F::Connection>> {
        match self.released.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Connection pool mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, PoolState<F::Connection>>,
        timeout: std::time::Duration,
    ) -> MutexGuard<'a, PoolState<F::Connection>> {
        match self.released.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => {
                tracing::warn!("Connection pool mutex was poisoned, recovering");
                poisoned.into_inner().0
            },
        }
    }

    /// Creates a connection for a slot already reserved in `creating`.
    fn create(&self) -> Result<PooledConnection<'_, F>> {
        let backend = self.factory.backend();
        match self.factory.create_connection() {
            Ok(connection) => {
                let mut state = acquire_lock(&self.state);
                state.creating -= 1;
                state.created += 1;
                if state.closed {
                    drop(state);
                    self.factory.close_connection(connection);
                    self.released.notify_all();
                    return Err(self.closed_error());
                }
                state.outstanding += 1;
                let created = state.created;
                drop(state);
                metrics::counter!("connection_pool_connections_created_total", "backend" => backend)
                    .increment(1);
                tracing::info!(backend, created, "Established backend connection");
                Ok(PooledConnection::new(self, connection))
            },
            Err(e) => {
                acquire_lock(&self.state).creating -= 1;
                self.released.notify_one();
                tracing::warn!(backend, error = %e, "Failed to establish backend connection");
                Err(e)
            },
        }
    }

    /// Returns a connection to the idle set.
    ///
    /// Use this for connections taken out with [`PooledConnection::detach`].
    /// Releasing when nothing is outstanding is a no-op for pool accounting:
    /// the surplus connection is closed and a warning is logged.
    pub fn release(&self, connection: F::Connection) {
        let mut state = acquire_lock(&self.state);
        if state.outstanding == 0 {
            drop(state);
            tracing::warn!(
                backend = self.factory.backend(),
                "Released a connection with none outstanding, closing it"
            );
            self.factory.close_connection(connection);
            return;
        }

        state.outstanding -= 1;
        if state.closed {
            drop(state);
            self.factory.close_connection(connection);
            self.released.notify_all();
            return;
        }

        state.idle.push(connection);
        let idle = state.idle.len();
        drop(state);
        metrics::gauge!("connection_pool_idle", "backend" => self.factory.backend())
            .set(idle as f64);
        tracing::debug!(backend = self.factory.backend(), "Released connection");
        self.released.notify_one();
    }

    /// Runs `operation` with a borrowed connection, releasing it on every exit.
    ///
    /// # Errors
    ///
    /// Returns the acquire error or the error of `operation`.
    pub fn with<T>(&self, operation: impl FnOnce(&mut F::Connection) -> Result<T>) -> Result<T> {
        let mut connection = self.acquire()?;
        operation(&mut connection)
    }

    /// Closes the pool.
    ///
    /// Idle connections are closed now, outstanding ones when released.
    /// Waiting and later acquires fail with [`Error::Connection`]. Closing
    /// twice is harmless.
    pub fn close(&self) {
        let mut state = acquire_lock(&self.state);
        if state.closed {
            return;
        }
        state.closed = true;
        let idle = std::mem::take(&mut state.idle);
        let outstanding = state.outstanding;
        drop(state);

        self.released.notify_all();
        let closed = idle.len();
        for connection in idle {
            self.factory.close_connection(connection);
        }
        metrics::gauge!("connection_pool_idle", "backend" => self.factory.backend()).set(0.0);
        tracing::info!(
            backend = self.factory.backend(),
            closed,
            outstanding,
            "Closed connection pool"
        );
    }

    /// Returns the current occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = acquire_lock(&self.state);
        PoolStatus {
            max_connections: self.config.max_connections,
            idle: state.idle.len(),
            outstanding: state.outstanding,
            created: state.created,
            closed: state.closed,
        }
    }
}

impl<F: ConnectionFactory> PoolControl for ConnectionPool<F> {
    fn close(&self) {
        Self::close(self);
    }

    fn status(&self) -> PoolStatus {
        Self::status(self)
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Returned to the pool when dropped, on success and error paths alike.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    connection: Option<F::Connection>,
}

impl<'a, F: ConnectionFactory> PooledConnection<'a, F> {
    const fn new(pool: &'a ConnectionPool<F>, connection: F::Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
        }
    }

    /// Takes the connection out of the guard.
    ///
    /// The connection still counts as outstanding; hand it back with
    /// [`ConnectionPool::release`].
    #[must_use]
    pub fn detach(mut self) -> Option<F::Connection> {
        self.connection.take()
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<'_, F> {
    type Target = F::Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only `detach` empties the slot, and it consumes the guard.
        self.connection.as_ref().expect("pooled connection present")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<'_, F> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("pooled connection present")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}
