//! Version-control-backed store.
//!
//! Items live in the working tree of a git repository. Every structural or
//! content change is committed on `HEAD`, so the history of the mount is the
//! history of the repository. Properties are JSON property bags stored as git
//! notes under [`NOTES_REF`], keyed by the blob hash of the item path.
//!
//! Git does not track empty directories, so every collection carries a
//! [`COLLECTION_MARKER`] file, hidden from listings.

mod data;
mod metadata;

pub use data::GitDataStorer;
pub use metadata::GitMetadataStorer;

use crate::config::PoolConfig;
use crate::models::ItemId;
use crate::storage::normalize::{Context, Normalize};
use crate::storage::pool::{ConnectionFactory, ConnectionPool};
use crate::{Error, Result};
use git2::{IndexAddOption, ObjectType, Oid, Repository, Signature};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const BACKEND: &str = "git";

/// Notes ref holding item properties.
pub const NOTES_REF: &str = "refs/notes/mountstore";

/// Marker file keeping collections alive in the repository.
pub const COLLECTION_MARKER: &str = ".mountstore";

const SIGNATURE_NAME: &str = "mountstore";
const SIGNATURE_EMAIL: &str = "mountstore@localhost";

/// Opens the repository, initializing it on first use.
pub struct GitRepositoryFactory {
    root: PathBuf,
}

impl GitRepositoryFactory {
    /// Creates a factory for the working tree at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ConnectionFactory for GitRepositoryFactory {
    type Connection = Repository;

    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn create_connection(&self) -> Result<Repository> {
        match Repository::open(&self.root) {
            Ok(repo) => Ok(repo),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                std::fs::create_dir_all(&self.root)
                    .normalize(Context::new(BACKEND, "create_repository_root"))?;
                let repo = Repository::init(&self.root)
                    .normalize(Context::new(BACKEND, "init_repository"))?;
                std::fs::write(self.root.join(COLLECTION_MARKER), b"")
                    .normalize(Context::new(BACKEND, "init_repository"))?;
                commit_all(&repo, "Initialize mount")?;
                tracing::info!(path = %self.root.display(), "Initialized repository");
                Ok(repo)
            },
            Err(e) => Err(Error::Connection {
                backend: BACKEND.to_string(),
                cause: format!("open_repository: {e}"),
            }),
        }
    }
}

/// Handle to one repository, shared by its storers.
#[derive(Clone)]
pub struct GitStore {
    pool: Arc<ConnectionPool<GitRepositoryFactory>>,
}

impl GitStore {
    /// Creates a store over the repository at `root`. No I/O happens until
    /// the first operation.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, pool: PoolConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(GitRepositoryFactory::new(root), pool)),
        }
    }

    /// Returns the shared pool.
    #[must_use]
    pub fn pool(&self) -> Arc<ConnectionPool<GitRepositoryFactory>> {
        Arc::clone(&self.pool)
    }

    /// Data storer over this repository.
    #[must_use]
    pub fn data(&self) -> GitDataStorer {
        GitDataStorer::new(self.clone())
    }

    /// Metadata storer over this repository.
    #[must_use]
    pub fn metadata(&self) -> GitMetadataStorer {
        GitMetadataStorer::new(self.clone())
    }
}

/// Working tree location of an item.
///
/// Segments reserved by the repository (`.git`, the collection marker) are
/// rejected.
pub(crate) fn worktree_path(repo: &Repository, id: &ItemId) -> Result<PathBuf> {
    if id
        .segments()
        .any(|s| s == ".git" || s == COLLECTION_MARKER)
    {
        return Err(Error::InvalidIdentifier(format!(
            "'{id}' addresses a reserved repository path"
        )));
    }
    let workdir = repo
        .workdir()
        .ok_or_else(|| Error::persistence("resolve_path", "repository has no working tree"))?;
    Ok(id.segments().fold(workdir.to_path_buf(), |path, s| path.join(s)))
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    repo.signature()
        .or_else(|_| Signature::now(SIGNATURE_NAME, SIGNATURE_EMAIL))
        .normalize(Context::new(BACKEND, "create_signature"))
}

/// Stages every change in the working tree and commits it on `HEAD`.
///
/// Nothing is committed if the staged tree equals the current one.
pub(crate) fn commit_all(repo: &Repository, message: &str) -> Result<()> {
    let ctx = Context::new(BACKEND, "commit");
    let mut index = repo.index().normalize(ctx)?;
    index
        .add_all(["*"], IndexAddOption::DEFAULT, None)
        .normalize(ctx)?;
    index.update_all(["*"], None).normalize(ctx)?;
    index.write().normalize(ctx)?;
    let tree_id = index.write_tree().normalize(ctx)?;

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
        return Ok(());
    }
    let tree = repo.find_tree(tree_id).normalize(ctx)?;
    let sig = signature(repo)?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .normalize(ctx)?;
    tracing::debug!(commit = %oid, summary = message, "Committed change");
    Ok(())
}

/// Note key of an item: the blob hash of its path.
fn note_key(id: &ItemId) -> Result<Oid> {
    Oid::hash_object(ObjectType::Blob, id.as_str().as_bytes())
        .normalize(Context::new(BACKEND, "note_key").item(id))
}

/// Reads the property note of an item.
pub(crate) fn read_note(repo: &Repository, id: &ItemId) -> Result<Option<String>> {
    match repo.find_note(Some(NOTES_REF), note_key(id)?) {
        Ok(note) => Ok(note.message().map(String::from)),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Context::new(BACKEND, "read_note").error(&e)),
    }
}

/// Writes (or, for `None`, removes) the property note of an item.
pub(crate) fn write_note(repo: &Repository, id: &ItemId, content: Option<&str>) -> Result<()> {
    let sig = signature(repo)?;
    let key = note_key(id)?;
    let ctx = Context::new(BACKEND, "write_note");
    match content {
        Some(text) => {
            repo.note(&sig, &sig, Some(NOTES_REF), key, text, true)
                .normalize(ctx)?;
        },
        None => match repo.note_delete(key, Some(NOTES_REF), &sig, &sig) {
            Ok(()) => {},
            Err(e) if e.code() == git2::ErrorCode::NotFound => {},
            Err(e) => return Err(ctx.error(&e)),
        },
    }
    Ok(())
}

/// Every item at or below `id` in the working tree, parents first.
pub(crate) fn subtree_ids(path: &Path, id: &ItemId) -> Result<Vec<ItemId>> {
    let mut out = vec![id.clone()];
    let meta = std::fs::symlink_metadata(path).normalize(Context::new(BACKEND, "walk").item(id))?;
    if meta.is_dir() {
        for name in list_dir(path, id)? {
            let child = id.join(&name)?;
            out.extend(subtree_ids(&path.join(&name), &child)?);
        }
    }
    Ok(out)
}

/// Sorted entry names of a directory, without repository bookkeeping.
pub(crate) fn list_dir(path: &Path, id: &ItemId) -> Result<Vec<String>> {
    let ctx = Context::new(BACKEND, "list").item(id);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path).normalize(ctx)? {
        let entry = entry.normalize(ctx)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != ".git" && name != COLLECTION_MARKER {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Carries the notes of a subtree over to its new location.
///
/// `remove_source` distinguishes a move from a copy.
pub(crate) fn relocate_notes(
    repo: &Repository,
    ids: &[ItemId],
    from: &ItemId,
    to: &ItemId,
    remove_source: bool,
) -> Result<()> {
    for id in ids {
        let Some(note) = read_note(repo, id)? else {
            continue;
        };
        if let Some(target) = id.rebase(from, to) {
            write_note(repo, &target, Some(&note))?;
        }
        if remove_source {
            write_note(repo, id, None)?;
        }
    }
    Ok(())
}
