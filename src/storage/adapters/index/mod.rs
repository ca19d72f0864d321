//! Precomputed full-text index.
//!
//! The index is an FTS5 table with two columns per indexed property (the
//! tokenized text and the whole-value key) and an unindexed `path` column
//! holding the item path relative to the mount, percent-encoded segment by
//! segment. It answers searches only; all other capabilities of an index
//! mount are null.
//!
//! ```text
//! item_index(path UNINDEXED, f_title, k_title, f_dc_author, k_dc_author, ...)
//! ```

mod search;
mod writer;

pub use search::IndexSearchStorer;
pub use writer::IndexWriter;

use crate::config::PoolConfig;
use crate::models::{ItemId, PropertyId};
use crate::storage::adapters::encode_relative;
use crate::storage::adapters::sqlite::SqliteConnectionFactory;
use crate::storage::pool::ConnectionPool;
use crate::storage::query::{FtsRestrictionMapper, fts_column, fts_key_column};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) const BACKEND: &str = "index";

/// Maximum number of hits returned by one search.
pub const MAX_SEARCH_RESULTS: usize = 100;

/// Handle to one index database, shared by its searcher and writer.
#[derive(Clone)]
pub struct IndexStore {
    pool: Arc<ConnectionPool<SqliteConnectionFactory>>,
    mapper: Arc<FtsRestrictionMapper>,
    columns: Arc<Vec<String>>,
}

impl IndexStore {
    /// Creates a store over the index at `path` holding `fields`.
    ///
    /// No I/O happens until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if no field is given or two
    /// fields map to the same index column.
    pub fn new<I, S>(path: impl Into<PathBuf>, fields: I, pool: PoolConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<PropertyId>,
    {
        let mapper = FtsRestrictionMapper::new(fields);
        if mapper.fields().is_empty() {
            return Err(Error::InvalidIdentifier(
                "an index needs at least one field".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(mapper.fields().len() * 2);
        for field in mapper.fields() {
            let column = fts_column(field);
            if !seen.insert(column.clone()) {
                return Err(Error::InvalidIdentifier(format!(
                    "index field '{field}' collides with another field as column '{column}'"
                )));
            }
            columns.push(column);
            columns.push(fts_key_column(field));
        }

        let schema = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS item_index USING fts5(path UNINDEXED, {});",
            columns.join(", ")
        );
        let factory = SqliteConnectionFactory::new(BACKEND, path, schema);
        Ok(Self {
            pool: Arc::new(ConnectionPool::new(factory, pool)),
            mapper: Arc::new(mapper),
            columns: Arc::new(columns),
        })
    }

    /// Returns the shared pool.
    #[must_use]
    pub fn pool(&self) -> Arc<ConnectionPool<SqliteConnectionFactory>> {
        Arc::clone(&self.pool)
    }

    /// Search storer over this index.
    #[must_use]
    pub fn searcher(&self) -> IndexSearchStorer {
        IndexSearchStorer::new(self.clone())
    }

    /// Writer maintaining this index.
    #[must_use]
    pub fn writer(&self) -> IndexWriter {
        IndexWriter::new(self.clone())
    }
}

/// Stored form of an item path: relative and percent-encoded.
pub(crate) fn encode_path(id: &ItemId) -> String {
    encode_relative(id)
}

/// Inverse of [`encode_path`].
pub(crate) fn decode_path(stored: &str) -> Result<ItemId> {
    ItemId::parse(&format!("/{stored}"))
}
