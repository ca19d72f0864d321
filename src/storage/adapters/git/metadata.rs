//! Properties as JSON notes.

use super::data::kind_at;
use super::{BACKEND, GitStore, read_note, worktree_path, write_note};
use crate::Result;
use crate::models::{ItemId, ItemKind, MetadataSet, Property, PropertyId, Restriction};
use crate::storage::mapping::{JsonBag, JsonBagMapper, SystemFacts, merge_derived};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::traits::{MetadataStorer, NullMetadataStorer};
use chrono::{DateTime, Utc};
use git2::Repository;
use std::fs;
use tracing::instrument;

/// [`MetadataStorer`] keeping one JSON property bag per item in a git note.
pub struct GitMetadataStorer {
    store: GitStore,
    mapper: JsonBagMapper,
}

impl GitMetadataStorer {
    pub(super) const fn new(store: GitStore) -> Self {
        Self {
            store,
            mapper: JsonBagMapper,
        }
    }

    fn load(repo: &Repository, id: &ItemId) -> Result<JsonBag> {
        read_note(repo, id)?.map_or_else(|| Ok(JsonBag::new()), |text| JsonBag::parse(&text))
    }

    fn store_bag(repo: &Repository, id: &ItemId, bag: &JsonBag) -> Result<()> {
        if bag.is_empty() {
            write_note(repo, id, None)
        } else {
            write_note(repo, id, Some(&bag.to_json_string()?))
        }
    }
}

fn facts(repo: &Repository, id: &ItemId) -> Result<SystemFacts> {
    let path = worktree_path(repo, id)?;
    let kind = kind_at(&path, id)?;
    let meta = fs::symlink_metadata(&path).normalize(Context::new(BACKEND, "stat").item(id))?;
    Ok(SystemFacts {
        created: meta.created().ok().map(DateTime::<Utc>::from),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        size: (kind == ItemKind::Leaf).then(|| meta.len()),
        owner: None,
        kind: Some(kind),
        mime_type: None,
    })
}

impl MetadataStorer for GitMetadataStorer {
    #[instrument(skip(self, selection), fields(backend = BACKEND, selected = selection.len()))]
    fn retrieve(&self, id: &ItemId, selection: &[PropertyId]) -> Result<MetadataSet> {
        let repo = self.store.pool.acquire()?;
        let facts = facts(&repo, id)?;
        let stored = Self::load(&repo, id)?.decode(&self.mapper, selection)?;
        Ok(merge_derived(stored, facts.into_properties(id)).filtered(selection))
    }

    #[instrument(skip(self, properties), fields(backend = BACKEND, count = properties.len()))]
    fn update(&self, id: &ItemId, properties: &[Property]) -> Result<()> {
        let repo = self.store.pool.acquire()?;
        kind_at(&worktree_path(&repo, id)?, id)?;
        let mut bag = Self::load(&repo, id)?;
        bag.update(&self.mapper, properties)?;
        Self::store_bag(&repo, id, &bag)
    }

    #[instrument(skip(self, ids), fields(backend = BACKEND, count = ids.len()))]
    fn delete(&self, id: &ItemId, ids: &[PropertyId]) -> Result<()> {
        let repo = self.store.pool.acquire()?;
        kind_at(&worktree_path(&repo, id)?, id)?;
        let mut bag = Self::load(&repo, id)?;
        bag.remove(ids);
        Self::store_bag(&repo, id, &bag)
    }

    fn search(&self, _restriction: &Restriction) -> Result<Vec<ItemId>> {
        NullMetadataStorer::search_unsupported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::{PropertyValue, system};
    use crate::storage::traits::DataStorer;

    fn id(path: &str) -> ItemId {
        ItemId::parse(path).unwrap()
    }

    #[test]
    fn test_properties_follow_moves() {
        let dir = tempfile::tempdir().unwrap();
        let store = GitStore::new(dir.path().join("repo"), PoolConfig::new(1));
        let data = store.data();
        let metadata = store.metadata();
        data.create_collection(&id("/a")).unwrap();
        data.write(&id("/a/b.txt"), &mut "hello".as_bytes()).unwrap();
        metadata
            .update(&id("/a/b.txt"), &[Property::new("format", "TEXT")])
            .unwrap();

        data.move_item(&id("/a"), &id("/z")).unwrap();
        let set = metadata.retrieve(&id("/z/b.txt"), &[]).unwrap();
        assert_eq!(set.value("format"), Some(&PropertyValue::from("TEXT")));
        assert_eq!(set.value(system::SIZE), Some(&PropertyValue::Integer(5)));
        assert!(set.contains(system::MODIFICATION_DATETIME));

        data.copy_item(&id("/z/b.txt"), &id("/c.txt")).unwrap();
        let copy = metadata.retrieve(&id("/c.txt"), &["format".into()]).unwrap();
        assert_eq!(copy.len(), 1);

        data.delete(&id("/z")).unwrap();
        data.create_collection(&id("/z")).unwrap();
        data.write(&id("/z/b.txt"), &mut "".as_bytes()).unwrap();
        let fresh = metadata.retrieve(&id("/z/b.txt"), &[]).unwrap();
        assert!(!fresh.contains("format"));
    }

    #[test]
    fn test_missing_note_is_empty_and_empty_bag_removes_note() {
        let dir = tempfile::tempdir().unwrap();
        let store = GitStore::new(dir.path().join("repo"), PoolConfig::new(1));
        let item = id("/doc.md");
        store.data().write(&item, &mut "# hi".as_bytes()).unwrap();

        let set = store.metadata().retrieve(&item, &["title".into()]).unwrap();
        assert!(set.is_empty());

        store
            .metadata()
            .update(&item, &[Property::new("title", "Hi")])
            .unwrap();
        store.metadata().delete(&item, &["title".into()]).unwrap();
        let pool = store.pool();
        let repo = pool.acquire().unwrap();
        assert_eq!(read_note(&repo, &item).unwrap(), None);
    }

    #[test]
    fn test_search_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = GitStore::new(dir.path(), PoolConfig::new(1));
        let err = store
            .metadata()
            .search(&Restriction::equals("a", "b"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CapabilityUnsupported);
    }
}
