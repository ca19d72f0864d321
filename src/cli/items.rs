//! Item CLI commands.

use super::emit;
use crate::models::{ItemId, ItemKind};
use crate::storage::Mount;
use crate::{Error, Result};
use std::io::{Read, Write};

/// Content and structure commands.
pub struct ItemsCommand<'a> {
    mount: &'a Mount,
}

impl<'a> ItemsCommand<'a> {
    /// Creates the command set for `mount`.
    #[must_use]
    pub const fn new(mount: &'a Mount) -> Self {
        Self { mount }
    }

    /// Copies the content of a leaf to `out`.
    pub fn get(&self, id: &ItemId, out: &mut dyn Write) -> Result<()> {
        let mut content = self.mount.data().read(id)?;
        std::io::copy(&mut content, out).map_err(|e| Error::persistence("write_output", e))?;
        Ok(())
    }

    /// Writes a leaf from `input`.
    pub fn put(&self, id: &ItemId, input: &mut dyn Read) -> Result<()> {
        self.mount.data().write(id, input)
    }

    /// Lists the children of a collection, collections with a trailing `/`.
    pub fn ls(&self, id: &ItemId, out: &mut dyn Write) -> Result<()> {
        let data = self.mount.data();
        for child in data.children(id)? {
            match data.kind(&child)? {
                ItemKind::Collection => emit(out, format_args!("{child}/"))?,
                ItemKind::Link => match data.link_target(&child)? {
                    Some(target) => emit(out, format_args!("{child} -> {target}"))?,
                    None => emit(out, &child)?,
                },
                ItemKind::Leaf => emit(out, &child)?,
            }
        }
        Ok(())
    }

    /// Creates a collection, and with `parents` every missing ancestor.
    pub fn mkdir(&self, id: &ItemId, parents: bool) -> Result<()> {
        let data = self.mount.data();
        if !parents {
            return data.create_collection(id);
        }
        let mut missing = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            if data.exists(&current)? {
                break;
            }
            cursor = current.parent();
            missing.push(current);
        }
        for collection in missing.iter().rev() {
            data.create_collection(collection)?;
        }
        Ok(())
    }

    /// Deletes an item and its subtree.
    pub fn rm(&self, id: &ItemId) -> Result<()> {
        self.mount.data().delete(id)
    }

    /// Moves an item.
    pub fn mv(&self, from: &ItemId, to: &ItemId) -> Result<()> {
        self.mount.data().move_item(from, to)
    }

    /// Copies an item.
    pub fn cp(&self, from: &ItemId, to: &ItemId) -> Result<()> {
        self.mount.data().copy_item(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, MountConfig};
    use crate::storage::connect;

    fn mount(dir: &tempfile::TempDir) -> Mount {
        let path = dir.path().join("objects.db").display().to_string();
        connect(&MountConfig::new("test", BackendKind::Sqlite, path)).unwrap()
    }

    fn id(path: &str) -> ItemId {
        ItemId::parse(path).unwrap()
    }

    #[test]
    fn test_put_get_ls() {
        let dir = tempfile::tempdir().unwrap();
        let mount = mount(&dir);
        let items = ItemsCommand::new(&mount);
        items.mkdir(&id("/a/b"), true).unwrap();
        items.put(&id("/a/b/c.txt"), &mut "hello".as_bytes()).unwrap();

        let mut content = Vec::new();
        items.get(&id("/a/b/c.txt"), &mut content).unwrap();
        assert_eq!(content, b"hello");

        let mut listing = Vec::new();
        items.ls(&id("/a"), &mut listing).unwrap();
        assert_eq!(String::from_utf8(listing).unwrap(), "/a/b/\n");
    }

    #[test]
    fn test_mkdir_without_parents_fails_on_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mount = mount(&dir);
        let err = ItemsCommand::new(&mount).mkdir(&id("/x/y"), false).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ItemNotFound);
    }

    #[test]
    fn test_mv_and_cp() {
        let dir = tempfile::tempdir().unwrap();
        let mount = mount(&dir);
        let items = ItemsCommand::new(&mount);
        items.put(&id("/a.txt"), &mut "x".as_bytes()).unwrap();
        items.cp(&id("/a.txt"), &id("/b.txt")).unwrap();
        items.mv(&id("/a.txt"), &id("/c.txt")).unwrap();
        items.rm(&id("/b.txt")).unwrap();

        let mut listing = Vec::new();
        items.ls(&ItemId::root(), &mut listing).unwrap();
        assert_eq!(String::from_utf8(listing).unwrap(), "/c.txt\n");
    }
}
