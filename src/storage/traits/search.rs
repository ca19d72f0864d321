//! Search storer trait.
//!
//! Index-backed search that runs independently of a live item tree, e.g.
//! against a precomputed full-text index.

use crate::models::{ItemId, Restriction};
use crate::{Capability, Error, Result};

/// Searches items through an index.
pub trait SearchStorer: Send + Sync {
    /// Returns matching item identifiers, best match first where the backend ranks.
    ///
    /// Restrictions the backend cannot compile fail with
    /// [`Error::QueryUnsupported`] before any I/O.
    fn search(&self, restriction: &Restriction) -> Result<Vec<ItemId>>;
}

/// Search storer of a backend without an index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSearchStorer;

impl SearchStorer for NullSearchStorer {
    fn search(&self, _restriction: &Restriction) -> Result<Vec<ItemId>> {
        Err(Error::unsupported(Capability::Search, "search"))
    }
}
