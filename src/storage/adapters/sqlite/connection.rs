//! Connection setup for `SQLite` backends.

use crate::storage::normalize::{Context, Normalize};
use crate::storage::pool::ConnectionFactory;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::PathBuf;

/// Configures a `SQLite` connection for concurrent pooled use.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds for locks instead of failing
/// - **`foreign_keys`**: property and ACL rows follow their item on delete
///
/// # Errors
///
/// Returns [`Error::Persistence`] if foreign-key enforcement cannot be enabled.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns the resulting mode as a row, so failures here are
    // not fatal (in-memory databases report "memory").
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::persistence("enable_foreign_keys", e))
}

/// Opens database files for a pool and ensures their schema.
pub struct SqliteConnectionFactory {
    backend: &'static str,
    path: PathBuf,
    schema: String,
}

impl SqliteConnectionFactory {
    /// Creates a factory for the database at `path`.
    ///
    /// `schema` is executed on every new connection and must be idempotent
    /// (`CREATE ... IF NOT EXISTS`).
    #[must_use]
    pub fn new(backend: &'static str, path: impl Into<PathBuf>, schema: impl Into<String>) -> Self {
        Self {
            backend,
            path: path.into(),
            schema: schema.into(),
        }
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    type Connection = Connection;

    fn backend(&self) -> &'static str {
        self.backend
    }

    fn create_connection(&self) -> Result<Connection> {
        let ctx = Context::new(self.backend, "open_database");
        let conn = Connection::open(&self.path).normalize(ctx)?;
        configure_connection(&conn)?;
        conn.execute_batch(&self.schema)
            .normalize(Context::new(self.backend, "initialize_schema"))?;
        tracing::debug!(backend = self.backend, path = %self.path.display(), "Opened database");
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();

        let synchronous: i32 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 1, "Expected NORMAL synchronous mode (1)");
        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);
        let foreign_keys: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_unopenable_path_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SqliteConnectionFactory::new(
            "sqlite",
            dir.path().join("missing").join("db.sqlite"),
            "",
        );
        let err = factory.create_connection().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Connection);
    }
}
