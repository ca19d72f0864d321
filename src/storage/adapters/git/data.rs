//! Working tree content and structure.

use super::{
    BACKEND, COLLECTION_MARKER, GitStore, commit_all, list_dir, relocate_notes, subtree_ids,
    worktree_path, write_note,
};
use crate::models::{ItemId, ItemKind};
use crate::storage::adapters::{check_relocation, read_all};
use crate::storage::normalize::{Context, Normalize};
use crate::storage::traits::DataStorer;
use crate::{Error, Result};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::instrument;

/// [`DataStorer`] over a git working tree.
pub struct GitDataStorer {
    store: GitStore,
}

impl GitDataStorer {
    pub(super) const fn new(store: GitStore) -> Self {
        Self { store }
    }
}

/// Kind of the item at `path`, without following links.
pub(super) fn kind_at(path: &Path, id: &ItemId) -> Result<ItemKind> {
    let meta = fs::symlink_metadata(path).normalize(Context::new(BACKEND, "stat").item(id))?;
    let ty = meta.file_type();
    Ok(if ty.is_symlink() {
        ItemKind::Link
    } else if ty.is_dir() {
        ItemKind::Collection
    } else {
        ItemKind::Leaf
    })
}

fn exists_at(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Checks that `id` is free and its parent is a collection.
fn require_free_slot(repo: &git2::Repository, id: &ItemId) -> Result<std::path::PathBuf> {
    let parent = id
        .parent()
        .ok_or_else(|| Error::persistence("create", "the root collection already exists"))?;
    let path = worktree_path(repo, id)?;
    if exists_at(&path) {
        return Err(Error::persistence("create", format!("{id} already exists")));
    }
    if kind_at(&worktree_path(repo, &parent)?, &parent)? != ItemKind::Collection {
        return Err(Error::persistence(
            "create",
            format!("parent {parent} is not a collection"),
        ));
    }
    Ok(path)
}

/// Relative link text pointing from the parent of `id` to `target`.
fn link_text(id: &ItemId, target: &ItemId) -> String {
    let ups = id.depth().saturating_sub(1);
    let mut text = "../".repeat(ups);
    text.push_str(target.relative());
    if text.is_empty() {
        text.push('.');
    }
    text
}

/// Resolves link text written by [`link_text`] back to a logical path.
fn resolve_link(id: &ItemId, text: &str) -> Result<ItemId> {
    if text.starts_with('/') {
        return Err(Error::persistence(
            "link_target",
            format!("link {id} points outside the mount"),
        ));
    }
    let mut segments: Vec<&str> = id.segments().collect();
    segments.pop();
    for part in text.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::persistence(
                        "link_target",
                        format!("link {id} points outside the mount"),
                    ));
                }
            },
            other => segments.push(other),
        }
    }
    ItemId::from_decoded(&format!("/{}", segments.join("/")))
}

#[cfg(unix)]
fn make_link(text: &str, path: &Path, id: &ItemId) -> Result<()> {
    std::os::unix::fs::symlink(text, path).normalize(Context::new(BACKEND, "create_link").item(id))
}

#[cfg(not(unix))]
fn make_link(_text: &str, _path: &Path, _id: &ItemId) -> Result<()> {
    Err(Error::unsupported(crate::Capability::Data, "create_link"))
}

/// Recursively copies a working tree entry, recreating links as links.
fn copy_tree(from: &Path, to: &Path, id: &ItemId) -> Result<()> {
    let ctx = Context::new(BACKEND, "copy_item").item(id);
    match kind_at(from, id)? {
        ItemKind::Leaf => {
            fs::copy(from, to).normalize(ctx)?;
        },
        ItemKind::Link => {
            let text = fs::read_link(from).normalize(ctx)?;
            make_link(&text.to_string_lossy(), to, id)?;
        },
        ItemKind::Collection => {
            fs::create_dir(to).normalize(ctx)?;
            fs::write(to.join(COLLECTION_MARKER), b"").normalize(ctx)?;
            for name in list_dir(from, id)? {
                copy_tree(&from.join(&name), &to.join(&name), &id.join(&name)?)?;
            }
        },
    }
    Ok(())
}

impl DataStorer for GitDataStorer {
    #[instrument(skip(self), fields(backend = BACKEND))]
    fn read(&self, id: &ItemId) -> Result<Box<dyn Read + Send>> {
        let repo = self.store.pool.acquire()?;
        let path = worktree_path(&repo, id)?;
        if kind_at(&path, id)? == ItemKind::Collection {
            return Err(Error::persistence("read", format!("{id} is a collection")));
        }
        // The working tree resolves relative links itself.
        let content = fs::read(&path).normalize(Context::new(BACKEND, "read").item(id))?;
        Ok(Box::new(Cursor::new(content)))
    }

    #[instrument(skip(self, data), fields(backend = BACKEND))]
    fn write(&self, id: &ItemId, data: &mut dyn Read) -> Result<()> {
        let content = read_all(data, id)?;
        let repo = self.store.pool.acquire()?;
        let path = worktree_path(&repo, id)?;
        if exists_at(&path) {
            let kind = kind_at(&path, id)?;
            if kind != ItemKind::Leaf {
                return Err(Error::persistence(
                    "write",
                    format!("{id} is a {kind}, not a leaf"),
                ));
            }
        } else {
            require_free_slot(&repo, id)?;
        }
        fs::write(&path, content).normalize(Context::new(BACKEND, "write").item(id))?;
        commit_all(&repo, &format!("Write {id}"))
    }

    fn exists(&self, id: &ItemId) -> Result<bool> {
        let repo = self.store.pool.acquire()?;
        Ok(exists_at(&worktree_path(&repo, id)?))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn delete(&self, id: &ItemId) -> Result<()> {
        if id.is_root() {
            return Err(Error::persistence("delete", "the root collection cannot be deleted"));
        }
        let repo = self.store.pool.acquire()?;
        let path = worktree_path(&repo, id)?;
        let ids = subtree_ids(&path, id)?;
        let ctx = Context::new(BACKEND, "delete").item(id);
        if kind_at(&path, id)? == ItemKind::Collection {
            fs::remove_dir_all(&path).normalize(ctx)?;
        } else {
            fs::remove_file(&path).normalize(ctx)?;
        }
        for removed in &ids {
            write_note(&repo, removed, None)?;
        }
        commit_all(&repo, &format!("Delete {id}"))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn create_collection(&self, id: &ItemId) -> Result<()> {
        let repo = self.store.pool.acquire()?;
        let path = require_free_slot(&repo, id)?;
        let ctx = Context::new(BACKEND, "create_collection").item(id);
        fs::create_dir(&path).normalize(ctx)?;
        fs::write(path.join(COLLECTION_MARKER), b"").normalize(ctx)?;
        commit_all(&repo, &format!("Create collection {id}"))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn create_link(&self, id: &ItemId, target: &ItemId) -> Result<()> {
        let repo = self.store.pool.acquire()?;
        worktree_path(&repo, target)?;
        let path = require_free_slot(&repo, id)?;
        make_link(&link_text(id, target), &path, id)?;
        commit_all(&repo, &format!("Link {id} to {target}"))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn move_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        check_relocation("move_item", id, new_id)?;
        let repo = self.store.pool.acquire()?;
        let from = worktree_path(&repo, id)?;
        let ids = subtree_ids(&from, id)?;
        let to = require_free_slot(&repo, new_id)?;
        fs::rename(&from, &to).normalize(Context::new(BACKEND, "move_item").item(id))?;
        relocate_notes(&repo, &ids, id, new_id, true)?;
        commit_all(&repo, &format!("Move {id} to {new_id}"))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn copy_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()> {
        check_relocation("copy_item", id, new_id)?;
        let repo = self.store.pool.acquire()?;
        let from = worktree_path(&repo, id)?;
        let ids = subtree_ids(&from, id)?;
        let to = require_free_slot(&repo, new_id)?;
        copy_tree(&from, &to, id)?;
        relocate_notes(&repo, &ids, id, new_id, false)?;
        commit_all(&repo, &format!("Copy {id} to {new_id}"))
    }

    fn kind(&self, id: &ItemId) -> Result<ItemKind> {
        let repo = self.store.pool.acquire()?;
        kind_at(&worktree_path(&repo, id)?, id)
    }

    fn children(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        let repo = self.store.pool.acquire()?;
        let path = worktree_path(&repo, id)?;
        if kind_at(&path, id)? != ItemKind::Collection {
            return Err(Error::persistence(
                "children",
                format!("{id} is not a collection"),
            ));
        }
        list_dir(&path, id)?
            .iter()
            .map(|name| id.join(name))
            .collect()
    }

    fn link_target(&self, id: &ItemId) -> Result<Option<ItemId>> {
        let repo = self.store.pool.acquire()?;
        let path = worktree_path(&repo, id)?;
        if kind_at(&path, id)? != ItemKind::Link {
            return Ok(None);
        }
        let text = fs::read_link(&path).normalize(Context::new(BACKEND, "link_target").item(id))?;
        resolve_link(id, &text.to_string_lossy()).map(Some)
    }
}
