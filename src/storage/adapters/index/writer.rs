//! Index maintenance.

use super::{BACKEND, IndexStore, encode_path};
use crate::Result;
use crate::models::{ItemId, MetadataSet};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::query::{exact_token, index_text};
use rusqlite::{params, params_from_iter};
use tracing::instrument;

/// Writes item properties into the index.
pub struct IndexWriter {
    store: IndexStore,
}

impl IndexWriter {
    pub(super) const fn new(store: IndexStore) -> Self {
        Self { store }
    }

    /// Indexes the properties of an item, replacing any previous entry.
    ///
    /// Only the index fields are written, each as its text and its key
    /// column; values without a text form are left empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    #[instrument(skip(self, properties), fields(backend = BACKEND))]
    pub fn index_item(&self, id: &ItemId, properties: &MetadataSet) -> Result<()> {
        let path = encode_path(id);
        let mut values: Vec<Option<String>> = Vec::with_capacity(self.store.columns.len() + 1);
        values.push(Some(path.clone()));
        for field in self.store.mapper.fields() {
            let text = properties.value(field.as_str()).and_then(index_text);
            let key = text.as_deref().map(exact_token);
            values.push(text);
            values.push(key);
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("?{n}")).collect();
        let sql = format!(
            "INSERT INTO item_index (path, {}) VALUES ({})",
            self.store.columns.join(", "),
            placeholders.join(", ")
        );

        let mut conn = self.store.pool.acquire()?;
        let ctx = Context::new(BACKEND, "index_item").item(id);
        let tx = conn.transaction().normalize(ctx)?;
        tx.execute("DELETE FROM item_index WHERE path = ?1", params![path])
            .normalize(ctx)?;
        tx.execute(&sql, params_from_iter(values.iter()))
            .normalize(ctx)?;
        tx.commit().normalize(ctx)
    }

    /// Removes an item from the index. Removing an unindexed item is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    #[instrument(skip(self), fields(backend = BACKEND))]
    pub fn remove(&self, id: &ItemId) -> Result<()> {
        let conn = self.store.pool.acquire()?;
        conn.execute(
            "DELETE FROM item_index WHERE path = ?1",
            params![encode_path(id)],
        )
        .normalize(Context::new(BACKEND, "remove").item(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::{Property, Restriction};
    use crate::storage::traits::SearchStorer;

    #[test]
    fn test_reindex_replaces_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("index.db"), ["title"], PoolConfig::new(1))
            .unwrap();
        let writer = store.writer();
        let item = ItemId::parse("/a.txt").unwrap();
        let title = |t: &str| -> MetadataSet { [Property::new("title", t)].into_iter().collect() };

        writer.index_item(&item, &title("first draft")).unwrap();
        writer.index_item(&item, &title("final version")).unwrap();
        let searcher = store.searcher();
        assert!(searcher.search(&Restriction::contains("title", "draft")).unwrap().is_empty());
        assert_eq!(
            searcher.search(&Restriction::contains("title", "final")).unwrap(),
            vec![item.clone()]
        );

        writer.remove(&item).unwrap();
        writer.remove(&item).unwrap();
        assert!(searcher.search(&Restriction::contains("title", "final")).unwrap().is_empty());
    }
}
