//! `SQLite` object store.
//!
//! A single database file holds the whole item tree: content, properties as
//! fixed attribute rows, and access-control lists. All three capabilities
//! share one connection pool.
//!
//! # Schema
//!
//! - `items`: one row per item (path, parent path, kind, content, link target,
//!   timestamps in epoch milliseconds, owner); the root collection always exists
//! - `properties`: `(item_id, name)` keyed attribute rows, see
//!   [`AttributeMapper`](crate::storage::mapping::AttributeMapper)
//! - `acl_entries`: ordered per-principal grant and deny sets

mod connection;
mod data;
mod metadata;
mod privilege;

pub use connection::{SqliteConnectionFactory, configure_connection};
pub use data::SqliteDataStorer;
pub use metadata::SqliteMetadataStorer;
pub use privilege::SqlitePrivilegeStorer;

use crate::config::PoolConfig;
use crate::models::{ItemId, ItemKind};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::pool::ConnectionPool;
use crate::storage::query::SqlParam;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) const BACKEND: &str = "sqlite";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent TEXT,
    kind TEXT NOT NULL,
    content BLOB,
    link_target TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    owner TEXT
);
CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent);
CREATE TABLE IF NOT EXISTS properties (
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    type_tag TEXT NOT NULL,
    text_value TEXT NOT NULL,
    num_value REAL,
    PRIMARY KEY (item_id, name)
);
CREATE INDEX IF NOT EXISTS idx_properties_name ON properties(name, type_tag);
CREATE TABLE IF NOT EXISTS acl_entries (
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    principal TEXT NOT NULL,
    principal_type TEXT NOT NULL,
    granted TEXT NOT NULL,
    denied TEXT NOT NULL,
    PRIMARY KEY (item_id, position)
);
INSERT OR IGNORE INTO items (path, parent, kind, created_at, modified_at)
    VALUES ('/', NULL, 'collection', CAST(strftime('%s', 'now') AS INTEGER) * 1000,
            CAST(strftime('%s', 'now') AS INTEGER) * 1000);
";

/// Handle to one object-store database, shared by its storers.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<ConnectionPool<SqliteConnectionFactory>>,
    owner: Option<String>,
}

impl SqliteStore {
    /// Creates a store over the database file at `path`. No I/O happens
    /// until the first operation.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, pool: PoolConfig, owner: Option<String>) -> Self {
        let factory = SqliteConnectionFactory::new(BACKEND, path, SCHEMA);
        Self {
            pool: Arc::new(ConnectionPool::new(factory, pool)),
            owner,
        }
    }

    /// Returns the shared pool.
    #[must_use]
    pub fn pool(&self) -> Arc<ConnectionPool<SqliteConnectionFactory>> {
        Arc::clone(&self.pool)
    }

    /// Data storer over this store.
    #[must_use]
    pub fn data(&self) -> SqliteDataStorer {
        SqliteDataStorer::new(self.clone())
    }

    /// Metadata storer over this store.
    #[must_use]
    pub fn metadata(&self) -> SqliteMetadataStorer {
        SqliteMetadataStorer::new(self.clone())
    }

    /// Privilege storer over this store.
    #[must_use]
    pub fn privileges(&self) -> SqlitePrivilegeStorer {
        SqlitePrivilegeStorer::new(self.clone())
    }
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Integer(i) => ToSqlOutput::from(*i),
            Self::Real(f) => ToSqlOutput::from(*f),
        })
    }
}

/// Item row as stored.
pub(crate) struct ItemRow {
    pub id: i64,
    pub kind: ItemKind,
    pub link_target: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
    pub owner: Option<String>,
    pub size: Option<i64>,
}

impl ItemRow {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.modified_at)
    }
}

type RawItemRow = (i64, String, Option<String>, i64, i64, Option<String>, Option<i64>);

pub(crate) fn find_item(conn: &Connection, id: &ItemId) -> Result<Option<ItemRow>> {
    let raw: Option<RawItemRow> = conn
        .query_row(
            "SELECT id, kind, link_target, created_at, modified_at, owner, length(content)
             FROM items WHERE path = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()
        .normalize(Context::new(BACKEND, "find_item").item(id))?;

    raw.map(|(row_id, kind, link_target, created_at, modified_at, owner, size)| {
        let kind = ItemKind::parse(&kind).ok_or_else(|| {
            Error::persistence("find_item", format!("unknown item kind '{kind}' at {id}"))
        })?;
        Ok(ItemRow {
            id: row_id,
            kind,
            link_target,
            created_at,
            modified_at,
            owner,
            size,
        })
    })
    .transpose()
}

pub(crate) fn require_item(conn: &Connection, id: &ItemId) -> Result<ItemRow> {
    find_item(conn, id)?.ok_or_else(|| Error::not_found(id))
}

/// Checks that `id` does not exist yet and its parent is a collection.
pub(crate) fn require_free_slot(conn: &Connection, id: &ItemId) -> Result<ItemId> {
    let parent = id
        .parent()
        .ok_or_else(|| Error::persistence("create", "the root collection already exists"))?;
    if find_item(conn, id)?.is_some() {
        return Err(Error::persistence("create", format!("{id} already exists")));
    }
    let row = require_item(conn, &parent)?;
    if row.kind != ItemKind::Collection {
        return Err(Error::persistence(
            "create",
            format!("parent {parent} is not a collection"),
        ));
    }
    Ok(parent)
}

/// Path prefix shared by every descendant of `id`.
///
/// Used with `substr(path, 1, length(?)) = ?`, which compares exactly; `LIKE`
/// would fold ASCII case and reach into sibling subtrees.
pub(crate) fn descendants_prefix(id: &ItemId) -> String {
    if id.is_root() {
        "/".to_string()
    } else {
        format!("{}/", id.as_str())
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
