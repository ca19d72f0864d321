//! Data storer trait.

use crate::models::{ItemId, ItemKind};
use crate::{Capability, Error, Result};
use std::io::Read;

/// Stores item content and structure.
///
/// # Implementor Notes
///
/// - Methods use `&self`; adapters borrow a pooled connection per call
/// - `read` returns a stream that no longer holds a connection
/// - `write` creates the leaf if missing; the parent collection must exist
/// - Every failure is an [`Error`]; nothing backend-native escapes
pub trait DataStorer: Send + Sync {
    /// Opens the content of a leaf for reading.
    fn read(&self, id: &ItemId) -> Result<Box<dyn Read + Send>>;

    /// Replaces the content of a leaf, creating it if necessary.
    fn write(&self, id: &ItemId, data: &mut dyn Read) -> Result<()>;

    /// Checks if an item exists.
    fn exists(&self, id: &ItemId) -> Result<bool>;

    /// Deletes an item (recursively for collections).
    fn delete(&self, id: &ItemId) -> Result<()>;

    /// Creates a collection. The parent must exist.
    fn create_collection(&self, id: &ItemId) -> Result<()>;

    /// Creates a link pointing at `target`.
    fn create_link(&self, id: &ItemId, target: &ItemId) -> Result<()>;

    /// Moves an item (and its subtree) to `new_id`.
    fn move_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()>;

    /// Copies an item (and its subtree) to `new_id`.
    fn copy_item(&self, id: &ItemId, new_id: &ItemId) -> Result<()>;

    /// Returns the structural kind of an item.
    fn kind(&self, id: &ItemId) -> Result<ItemKind>;

    /// Lists the direct children of a collection.
    fn children(&self, id: &ItemId) -> Result<Vec<ItemId>>;

    /// Returns the target of a link, `None` for other kinds.
    fn link_target(&self, id: &ItemId) -> Result<Option<ItemId>>;
}

/// Data storer of a backend without data capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDataStorer;

impl NullDataStorer {
    const fn unsupported(operation: &'static str) -> Error {
        Error::unsupported(Capability::Data, operation)
    }
}

impl DataStorer for NullDataStorer {
    fn read(&self, _id: &ItemId) -> Result<Box<dyn Read + Send>> {
        Err(Self::unsupported("read"))
    }

    fn write(&self, _id: &ItemId, _data: &mut dyn Read) -> Result<()> {
        Err(Self::unsupported("write"))
    }

    fn exists(&self, _id: &ItemId) -> Result<bool> {
        Err(Self::unsupported("exists"))
    }

    fn delete(&self, _id: &ItemId) -> Result<()> {
        Err(Self::unsupported("delete"))
    }

    fn create_collection(&self, _id: &ItemId) -> Result<()> {
        Err(Self::unsupported("create_collection"))
    }

    fn create_link(&self, _id: &ItemId, _target: &ItemId) -> Result<()> {
        Err(Self::unsupported("create_link"))
    }

    fn move_item(&self, _id: &ItemId, _new_id: &ItemId) -> Result<()> {
        Err(Self::unsupported("move_item"))
    }

    fn copy_item(&self, _id: &ItemId, _new_id: &ItemId) -> Result<()> {
        Err(Self::unsupported("copy_item"))
    }

    fn kind(&self, _id: &ItemId) -> Result<ItemKind> {
        Err(Self::unsupported("kind"))
    }

    fn children(&self, _id: &ItemId) -> Result<Vec<ItemId>> {
        Err(Self::unsupported("children"))
    }

    fn link_target(&self, _id: &ItemId) -> Result<Option<ItemId>> {
        Err(Self::unsupported("link_target"))
    }
}
