//! Ranked full-text search.

use super::{BACKEND, IndexStore, MAX_SEARCH_RESULTS, decode_path};
use crate::Result;
use crate::models::{ItemId, Restriction};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::query::RestrictionMapper;
use crate::storage::traits::SearchStorer;
use rusqlite::params;
use tracing::instrument;

/// [`SearchStorer`] over the index, ranked by BM25.
pub struct IndexSearchStorer {
    store: IndexStore,
}

impl IndexSearchStorer {
    pub(super) const fn new(store: IndexStore) -> Self {
        Self { store }
    }
}

impl SearchStorer for IndexSearchStorer {
    #[instrument(skip_all, fields(backend = BACKEND))]
    fn search(&self, restriction: &Restriction) -> Result<Vec<ItemId>> {
        let expression = self.store.mapper.compile(restriction)?;
        tracing::debug!(expression = %expression, "Compiled index query");

        let conn = self.store.pool.acquire()?;
        let ctx = Context::new(BACKEND, "search");
        let mut stmt = conn
            .prepare(
                "SELECT path FROM item_index WHERE item_index MATCH ?1
                 ORDER BY bm25(item_index) LIMIT ?2",
            )
            .normalize(ctx)?;
        let limit = i64::try_from(MAX_SEARCH_RESULTS).unwrap_or(i64::MAX);
        let stored = stmt
            .query_map(params![expression, limit], |r| r.get::<_, String>(0))
            .normalize(ctx)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .normalize(ctx)?;
        stored.iter().map(|p| decode_path(p)).collect()
    }
}
