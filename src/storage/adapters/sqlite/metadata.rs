//! Properties as attribute rows, plus metadata search.

use super::{BACKEND, SqliteStore, now_millis, require_item};
use crate::Result;
use crate::models::{ItemId, ItemKind, MetadataSet, Property, PropertyId, Restriction};
use crate::storage::mapping::{
    AttributeMapper, NativeAttribute, SystemFacts, ValueMapper, merge_derived,
};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::query::{RestrictionMapper, SqlRestrictionMapper};
use crate::storage::traits::MetadataStorer;
use rusqlite::{params, params_from_iter};
use tracing::instrument;

/// [`MetadataStorer`] over the object store.
pub struct SqliteMetadataStorer {
    store: SqliteStore,
    mapper: AttributeMapper,
}

impl SqliteMetadataStorer {
    pub(super) const fn new(store: SqliteStore) -> Self {
        Self {
            store,
            mapper: AttributeMapper,
        }
    }
}

impl MetadataStorer for SqliteMetadataStorer {
    #[instrument(skip(self, selection), fields(backend = BACKEND, selected = selection.len()))]
    fn retrieve(&self, id: &ItemId, selection: &[PropertyId]) -> Result<MetadataSet> {
        let conn = self.store.pool.acquire()?;
        let row = require_item(&conn, id)?;
        let ctx = Context::new(BACKEND, "retrieve").item(id);

        let mut stmt = conn
            .prepare(
                "SELECT name, type_tag, text_value, num_value FROM properties
                 WHERE item_id = ?1 ORDER BY name",
            )
            .normalize(ctx)?;
        let rows = stmt
            .query_map(params![row.id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    NativeAttribute {
                        type_tag: r.get(1)?,
                        text: r.get(2)?,
                        number: r.get(3)?,
                    },
                ))
            })
            .normalize(ctx)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .normalize(ctx)?;

        let mut stored = MetadataSet::new();
        for (name, native) in rows {
            let property_id = PropertyId::new(name);
            if !selection.is_empty() && !selection.contains(&property_id) {
                continue;
            }
            stored.insert(self.mapper.from_native(&property_id, &native, None)?);
        }

        let facts = SystemFacts {
            created: row.created(),
            modified: row.modified(),
            size: (row.kind == ItemKind::Leaf)
                .then(|| row.size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0)),
            owner: row.owner.clone(),
            kind: Some(row.kind),
            mime_type: None,
        };
        Ok(merge_derived(stored, facts.into_properties(id)).filtered(selection))
    }

    #[instrument(skip(self, properties), fields(backend = BACKEND, count = properties.len()))]
    fn update(&self, id: &ItemId, properties: &[Property]) -> Result<()> {
        let encoded = properties
            .iter()
            .map(|p| Ok((p.id.as_str(), self.mapper.to_native(p)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_update"))?;
        let row = require_item(&tx, id)?;
        let ctx = Context::new(BACKEND, "update").item(id);
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO properties (item_id, name, type_tag, text_value, num_value)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(item_id, name) DO UPDATE SET
                         type_tag = excluded.type_tag,
                         text_value = excluded.text_value,
                         num_value = excluded.num_value",
                )
                .normalize(ctx)?;
            for (name, native) in &encoded {
                stmt.execute(params![row.id, name, native.type_tag, native.text, native.number])
                    .normalize(ctx)?;
            }
        }
        tx.execute(
            "UPDATE items SET modified_at = ?1 WHERE id = ?2",
            params![now_millis(), row.id],
        )
        .normalize(ctx)?;
        tx.commit().normalize(ctx)
    }

    #[instrument(skip(self, ids), fields(backend = BACKEND, count = ids.len()))]
    fn delete(&self, id: &ItemId, ids: &[PropertyId]) -> Result<()> {
        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_delete_properties"))?;
        let row = require_item(&tx, id)?;
        let ctx = Context::new(BACKEND, "delete_properties").item(id);
        let mut removed = 0;
        for property in ids {
            removed += tx
                .execute(
                    "DELETE FROM properties WHERE item_id = ?1 AND name = ?2",
                    params![row.id, property.as_str()],
                )
                .normalize(ctx)?;
        }
        if removed > 0 {
            tx.execute(
                "UPDATE items SET modified_at = ?1 WHERE id = ?2",
                params![now_millis(), row.id],
            )
            .normalize(ctx)?;
        }
        tx.commit().normalize(ctx)
    }

    #[instrument(skip_all, fields(backend = BACKEND))]
    fn search(&self, restriction: &Restriction) -> Result<Vec<ItemId>> {
        let query = SqlRestrictionMapper.compile(restriction)?;
        let sql = format!(
            "SELECT i.path FROM items i WHERE {} ORDER BY i.path",
            query.clause
        );
        tracing::debug!(clause = %query.clause, params = query.params.len(), "Compiled search");

        let conn = self.store.pool.acquire()?;
        let ctx = Context::new(BACKEND, "search");
        let mut stmt = conn.prepare(&sql).normalize(ctx)?;
        let paths = stmt
            .query_map(params_from_iter(query.params.iter()), |r| {
                r.get::<_, String>(0)
            })
            .normalize(ctx)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .normalize(ctx)?;
        paths.iter().map(|p| ItemId::from_decoded(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::{PropertyOrigin, PropertyValue, system};
    use crate::storage::traits::DataStorer;
    use chrono::{TimeZone, Utc};

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(
            dir.path().join("db.sqlite"),
            PoolConfig::new(2),
            Some("alice".to_string()),
        );
        (dir, store)
    }

    fn id(path: &str) -> ItemId {
        ItemId::parse(path).unwrap()
    }

    #[test]
    fn test_round_trip_and_delete() {
        let (_dir, store) = store();
        store.data().create_collection(&id("/a")).unwrap();
        store.data().write(&id("/a/b.txt"), &mut "".as_bytes()).unwrap();
        let metadata = store.metadata();
        metadata
            .update(
                &id("/a/b.txt"),
                &[
                    Property::new("size", 0_i64),
                    Property::new("format", "TEXT"),
                ],
            )
            .unwrap();

        let set = metadata.retrieve(&id("/a/b.txt"), &[]).unwrap();
        assert_eq!(set.value("size"), Some(&PropertyValue::Integer(0)));
        assert_eq!(set.value("format"), Some(&PropertyValue::from("TEXT")));
        assert_eq!(set.value(system::SIZE), Some(&PropertyValue::Integer(0)));
        assert_eq!(set.value(system::OWNER), Some(&PropertyValue::from("alice")));
        assert_eq!(
            set.value(system::MIME_TYPE),
            Some(&PropertyValue::from("text/plain"))
        );

        metadata.delete(&id("/a/b.txt"), &["size".into()]).unwrap();
        let set = metadata.retrieve(&id("/a/b.txt"), &[]).unwrap();
        assert!(!set.contains("size"));
        assert!(set.contains("format"));
    }

    #[test]
    fn test_property_removal_touches_modification_time() {
        let (_dir, store) = store();
        let item = id("/doc");
        store.data().write(&item, &mut "abc".as_bytes()).unwrap();
        let metadata = store.metadata();
        metadata.update(&item, &[Property::new("title", "Report")]).unwrap();
        let modified = |metadata: &SqliteMetadataStorer| {
            metadata
                .retrieve(&item, &[PropertyId::new(system::MODIFICATION_DATETIME)])
                .unwrap()
                .value(system::MODIFICATION_DATETIME)
                .cloned()
                .unwrap()
        };
        let before = modified(&metadata);

        std::thread::sleep(std::time::Duration::from_millis(5));
        metadata.delete(&item, &["missing".into()]).unwrap();
        assert_eq!(modified(&metadata), before);

        metadata.delete(&item, &["title".into()]).unwrap();
        assert_ne!(modified(&metadata), before);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let (_dir, store) = store();
        let item = id("/doc");
        store.data().write(&item, &mut "abc".as_bytes()).unwrap();
        store
            .metadata()
            .update(&item, &[Property::new("title", "Report"), Property::new("n", 2_i64)])
            .unwrap();

        let selection = vec![PropertyId::new("title"), PropertyId::new("missing")];
        let first = store.metadata().retrieve(&item, &selection).unwrap();
        let second = store.metadata().retrieve(&item, &selection).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_derived_value_wins_over_stored_override() {
        let (_dir, store) = store();
        let item = id("/doc");
        store.data().write(&item, &mut "abc".as_bytes()).unwrap();
        store
            .metadata()
            .update(&item, &[Property::new(system::SIZE, 99_i64)])
            .unwrap();

        let set = store.metadata().retrieve(&item, &[]).unwrap();
        let size = set.get(system::SIZE).unwrap();
        assert_eq!(size.value, PropertyValue::Integer(3));
        assert_eq!(size.origin, PropertyOrigin::Derived);
        assert!(size.is_system_managed());
    }

    #[test]
    fn test_search_by_property_and_system_column() {
        let (_dir, store) = store();
        let data = store.data();
        data.create_collection(&id("/r")).unwrap();
        for (name, year) in [("a", 2019_i64), ("b", 2021), ("c", 2023)] {
            let item = id(&format!("/r/{name}"));
            data.write(&item, &mut name.as_bytes()).unwrap();
            store
                .metadata()
                .update(
                    &item,
                    &[
                        Property::new("year", year),
                        Property::new(
                            "reviewed",
                            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                        ),
                    ],
                )
                .unwrap();
        }

        let found = store
            .metadata()
            .search(&Restriction::range("year", Some(2020_i64.into()), None))
            .unwrap();
        assert_eq!(found, vec![id("/r/b"), id("/r/c")]);

        let found = store
            .metadata()
            .search(
                &Restriction::equals(system::CONTENT_FORMAT, "collection")
                    .or(Restriction::equals("year", 2019_i64)),
            )
            .unwrap();
        assert_eq!(found, vec![ItemId::root(), id("/r"), id("/r/a")]);
    }

    #[test]
    fn test_search_rejects_before_io() {
        let (_dir, store) = store();
        let err = store
            .metadata()
            .search(&Restriction::equals(system::MIME_TYPE, "text/plain"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueryUnsupported);
        assert_eq!(store.pool().status().created, 0);
    }

    #[test]
    fn test_retrieve_missing_item() {
        let (_dir, store) = store();
        let err = store.metadata().retrieve(&id("/nope"), &[]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ItemNotFound);
    }
}
