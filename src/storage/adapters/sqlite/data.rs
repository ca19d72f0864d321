//! Item content and structure in `SQLite`.

use super::{
    BACKEND, SqliteStore, descendants_prefix, find_item, now_millis, require_free_slot,
    require_item,
};
use crate::models::{ItemId, ItemKind};
use crate::storage::adapters::{MAX_LINK_HOPS, check_relocation, read_all};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::traits::DataStorer;
use crate::{Error, Result};
use rusqlite::params;
use std::io::{Cursor, Read};
use tracing::instrument;

/// [`DataStorer`] over the object store.
pub struct SqliteDataStorer {
    store: SqliteStore,
}

impl SqliteDataStorer {
    pub(super) const fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

const COPY_PROPERTIES: &str = "
    INSERT INTO properties (item_id, name, type_tag, text_value, num_value)
    SELECT n.id, t.name, t.type_tag, t.text_value, t.num_value
    FROM items o
    JOIN properties t ON t.item_id = o.id
    JOIN items n ON n.path = ?1 || substr(o.path, ?2 + 1)
    WHERE o.path = ?3 OR substr(o.path, 1, length(?4)) = ?4";

const COPY_ACL_ENTRIES: &str = "
    INSERT INTO acl_entries (item_id, position, principal, principal_type, granted, denied)
    SELECT n.id, t.position, t.principal, t.principal_type, t.granted, t.denied
    FROM items o
    JOIN acl_entries t ON t.item_id = o.id
    JOIN items n ON n.path = ?1 || substr(o.path, ?2 + 1)
    WHERE o.path = ?3 OR substr(o.path, 1, length(?4)) = ?4";

fn char_len(id: &ItemId) -> i64 {
    i64::try_from(id.as_str().chars().count()).unwrap_or(i64::MAX)
}

impl DataStorer for SqliteDataStorer {
    #[instrument(skip(self), fields(backend = BACKEND))]
    fn read(&self, id: &ItemId) -> Result<Box<dyn Read + Send>> {
        let conn = self.store.pool.acquire()?;
        let mut current = id.clone();
        for _ in 0..MAX_LINK_HOPS {
            let row = require_item(&conn, &current)?;
            match row.kind {
                ItemKind::Leaf => {
                    let content: Option<Vec<u8>> = conn
                        .query_row(
                            "SELECT content FROM items WHERE id = ?1",
                            params![row.id],
                            |r| r.get(0),
                        )
                        .normalize(Context::new(BACKEND, "read").item(&current))?;
                    return Ok(Box::new(Cursor::new(content.unwrap_or_default())));
                },
                ItemKind::Link => {
                    let target = row.link_target.unwrap_or_default();
                    current = ItemId::from_decoded(&target)?;
                },
                ItemKind::Collection => {
                    return Err(Error::persistence(
                        "read",
                        format!("{current} is a collection"),
                    ));
                },
            }
        }
        Err(Error::persistence("read", format!("too many link hops from {id}")))
    }

    #[instrument(skip(self, data), fields(backend = BACKEND))]
    fn write(&self, id: &ItemId, data: &mut dyn Read) -> Result<()> {
        let content = read_all(data, id)?;
        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_write"))?;
        let ctx = Context::new(BACKEND, "write").item(id);
        let now = now_millis();

        match find_item(&tx, id)? {
            Some(row) if row.kind == ItemKind::Leaf => {
                tx.execute(
                    "UPDATE items SET content = ?1, modified_at = ?2 WHERE id = ?3",
                    params![content, now, row.id],
                )
                .normalize(ctx)?;
            },
            Some(row) => {
                return Err(Error::persistence(
                    "write",
                    format!("{id} is a {}, not a leaf", row.kind),
                ));
            },
            None => {
                let parent = require_free_slot(&tx, id)?;
                tx.execute(
                    "INSERT INTO items (path, parent, kind, content, created_at, modified_at, owner)
                     VALUES (?1, ?2, 'leaf', ?3, ?4, ?4, ?5)",
                    params![id.as_str(), parent.as_str(), content, now, self.store.owner],
                )
                .normalize(ctx)?;
            },
        }
        tx.commit().normalize(ctx)
    }

    fn exists(&self, id: &ItemId) -> Result<bool> {
        let conn = self.store.pool.acquire()?;
        Ok(find_item(&conn, id)?.is_some())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn delete(&self, id: &ItemId) -> Result<()> {
        if id.is_root() {
            return Err(Error::persistence("delete", "the root collection cannot be deleted"));
        }
        let conn = self.store.pool.acquire()?;
        require_item(&conn, id)?;
        conn.execute(
            "DELETE FROM items WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2",
            params![id.as_str(), descendants_prefix(id)],
        )
        .normalize(Context::new(BACKEND, "delete").item(id))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn create_collection(&self, id: &ItemId) -> Result<()> {
        let conn = self.store.pool.acquire()?;
        let parent = require_free_slot(&conn, id)?;
        let now = now_millis();
        conn.execute(
            "INSERT INTO items (path, parent, kind, created_at, modified_at, owner)
             VALUES (?1, ?2, 'collection', ?3, ?3, ?4)",
            params![id.as_str(), parent.as_str(), now, self.store.owner],
        )
        .normalize(Context::new(BACKEND, "create_collection").item(id))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn create_link(&self, id: &ItemId, target: &ItemId) -> Result<()> {
        let conn = self.store.pool.acquire()?;
        let parent = require_free_slot(&conn, id)?;
        let now = now_millis();
        conn.execute(
            "INSERT INTO items (path, parent, kind, link_target, created_at, modified_at, owner)
             VALUES (?1, ?2, 'link', ?3, ?4, ?4, ?5)",
            params![id.as_str(), parent.as_str(), target.as_str(), now, self.store.owner],
        )
        .normalize(Context::new(BACKEND, "create_link").item(id))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn move_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        check_relocation("move_item", id, new_id)?;
        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_move"))?;
        require_item(&tx, id)?;
        let new_parent = require_free_slot(&tx, new_id)?;
        let ctx = Context::new(BACKEND, "move_item").item(id);

        tx.execute(
            "UPDATE items SET path = ?1 || substr(path, ?2 + 1),
                              parent = ?1 || substr(parent, ?2 + 1)
             WHERE substr(path, 1, length(?3)) = ?3",
            params![new_id.as_str(), char_len(id), descendants_prefix(id)],
        )
        .normalize(ctx)?;
        tx.execute(
            "UPDATE items SET path = ?1, parent = ?2, modified_at = ?3 WHERE path = ?4",
            params![new_id.as_str(), new_parent.as_str(), now_millis(), id.as_str()],
        )
        .normalize(ctx)?;
        tx.commit().normalize(ctx)
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn copy_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        check_relocation("copy_item", id, new_id)?;
        let mut conn = self.store.pool.acquire()?;
        let tx = conn
            .transaction()
            .normalize(Context::new(BACKEND, "begin_copy"))?;
        require_item(&tx, id)?;
        let new_parent = require_free_slot(&tx, new_id)?;
        let ctx = Context::new(BACKEND, "copy_item").item(id);
        let len = char_len(id);
        let prefix = descendants_prefix(id);

        tx.execute(
            "INSERT INTO items (path, parent, kind, content, link_target, created_at, modified_at, owner)
             SELECT ?1 || substr(path, ?2 + 1),
                    CASE WHEN path = ?3 THEN ?4 ELSE ?1 || substr(parent, ?2 + 1) END,
                    kind, content, link_target, ?5, ?5, owner
             FROM items WHERE path = ?3 OR substr(path, 1, length(?6)) = ?6",
            params![new_id.as_str(), len, id.as_str(), new_parent.as_str(), now_millis(), prefix],
        )
        .normalize(ctx)?;
        for sql in [COPY_PROPERTIES, COPY_ACL_ENTRIES] {
            tx.execute(sql, params![new_id.as_str(), len, id.as_str(), prefix])
                .normalize(ctx)?;
        }
        tx.commit().normalize(ctx)
    }

    fn kind(&self, id: &ItemId) -> Result<ItemKind> {
        let conn = self.store.pool.acquire()?;
        Ok(require_item(&conn, id)?.kind)
    }

    fn children(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        let conn = self.store.pool.acquire()?;
        let row = require_item(&conn, id)?;
        if row.kind != ItemKind::Collection {
            return Err(Error::persistence(
                "children",
                format!("{id} is not a collection"),
            ));
        }
        let ctx = Context::new(BACKEND, "children").item(id);
        let mut stmt = conn
            .prepare("SELECT path FROM items WHERE parent = ?1 ORDER BY path")
            .normalize(ctx)?;
        let paths = stmt
            .query_map(params![id.as_str()], |r| r.get::<_, String>(0))
            .normalize(ctx)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .normalize(ctx)?;
        paths.iter().map(|p| ItemId::from_decoded(p)).collect()
    }

    fn link_target(&self, id: &ItemId) -> Result<Option<ItemId>> {
        let conn = self.store.pool.acquire()?;
        let row = require_item(&conn, id)?;
        match (row.kind, row.link_target) {
            (ItemKind::Link, Some(target)) => ItemId::from_decoded(&target).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn store() -> (tempfile::TempDir, SqliteDataStorer) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("db.sqlite"), PoolConfig::new(2), None);
        (dir, store.data())
    }

    fn id(path: &str) -> ItemId {
        ItemId::parse(path).unwrap()
    }

    fn read_string(data: &SqliteDataStorer, path: &str) -> String {
        let mut out = String::new();
        data.read(&id(path)).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_write_requires_parent() {
        let (_dir, data) = store();
        let err = data.write(&id("/a/b.txt"), &mut "x".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ItemNotFound);

        data.create_collection(&id("/a")).unwrap();
        data.write(&id("/a/b.txt"), &mut "hello".as_bytes()).unwrap();
        data.write(&id("/a/b.txt"), &mut "hello again".as_bytes()).unwrap();
        assert_eq!(read_string(&data, "/a/b.txt"), "hello again");
        assert_eq!(data.kind(&id("/a/b.txt")).unwrap(), ItemKind::Leaf);
    }

    #[test]
    fn test_move_rewrites_subtree() {
        let (_dir, data) = store();
        data.create_collection(&id("/a")).unwrap();
        data.create_collection(&id("/a/sub")).unwrap();
        data.write(&id("/a/sub/f"), &mut "1".as_bytes()).unwrap();
        data.create_collection(&id("/b")).unwrap();

        data.move_item(&id("/a"), &id("/b/a2")).unwrap();
        assert!(!data.exists(&id("/a")).unwrap());
        assert_eq!(read_string(&data, "/b/a2/sub/f"), "1");
        assert_eq!(data.children(&id("/b/a2")).unwrap(), vec![id("/b/a2/sub")]);
    }

    #[test]
    fn test_copy_keeps_source() {
        let (_dir, data) = store();
        data.create_collection(&id("/a")).unwrap();
        data.write(&id("/a/f"), &mut "x".as_bytes()).unwrap();
        data.copy_item(&id("/a"), &id("/c")).unwrap();
        assert_eq!(read_string(&data, "/a/f"), "x");
        assert_eq!(read_string(&data, "/c/f"), "x");
        assert!(data.copy_item(&id("/a"), &id("/a/inner")).is_err());
    }

    #[test]
    fn test_links_resolve_on_read() {
        let (_dir, data) = store();
        data.write(&id("/f"), &mut "target".as_bytes()).unwrap();
        data.create_link(&id("/l"), &id("/f")).unwrap();
        assert_eq!(data.kind(&id("/l")).unwrap(), ItemKind::Link);
        assert_eq!(data.link_target(&id("/l")).unwrap(), Some(id("/f")));
        assert_eq!(data.link_target(&id("/f")).unwrap(), None);
        assert_eq!(read_string(&data, "/l"), "target");
    }

    #[test]
    fn test_delete_is_recursive() {
        let (_dir, data) = store();
        data.create_collection(&id("/a")).unwrap();
        data.write(&id("/a/f"), &mut "x".as_bytes()).unwrap();
        data.write(&id("/a_f"), &mut "y".as_bytes()).unwrap();
        data.delete(&id("/a")).unwrap();
        assert!(!data.exists(&id("/a/f")).unwrap());
        assert!(data.exists(&id("/a_f")).unwrap());
        assert!(data.delete(&ItemId::root()).is_err());
        assert_eq!(
            data.delete(&id("/a")).unwrap_err().kind(),
            crate::ErrorKind::ItemNotFound
        );
    }

    #[test]
    fn test_subtree_operations_respect_case() {
        let (_dir, data) = store();
        data.create_collection(&id("/a")).unwrap();
        data.write(&id("/a/keep.txt"), &mut "lower".as_bytes()).unwrap();
        data.create_collection(&id("/A")).unwrap();
        data.write(&id("/A/f"), &mut "upper".as_bytes()).unwrap();

        data.copy_item(&id("/A"), &id("/B")).unwrap();
        assert_eq!(data.children(&id("/B")).unwrap(), vec![id("/B/f")]);

        data.move_item(&id("/A"), &id("/Z")).unwrap();
        assert_eq!(read_string(&data, "/a/keep.txt"), "lower");
        assert!(!data.exists(&id("/Z/keep.txt")).unwrap());

        data.delete(&id("/Z")).unwrap();
        assert!(data.exists(&id("/a/keep.txt")).unwrap());
    }
}
