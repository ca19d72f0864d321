//! Metadata storer trait.

use crate::models::{ItemId, MetadataSet, Property, PropertyId, Restriction};
use crate::{Capability, Error, Result};

/// Stores item properties.
///
/// # Contract
///
/// - `retrieve` with an empty selection returns every available property,
///   including the system-managed ones the backend can derive
/// - identifiers in the selection that are not present are silently omitted
/// - an item without any stored metadata yields an empty (or derived-only)
///   set, not an error
/// - `update` merges; properties not named are left untouched, including
///   foreign entries the adapter does not understand
pub trait MetadataStorer: Send + Sync {
    /// Retrieves properties, optionally restricted to `selection`.
    fn retrieve(&self, id: &ItemId, selection: &[PropertyId]) -> Result<MetadataSet>;

    /// Stores or replaces the given properties.
    fn update(&self, id: &ItemId, properties: &[Property]) -> Result<()>;

    /// Deletes the named properties. Missing identifiers are ignored.
    fn delete(&self, id: &ItemId, property_ids: &[PropertyId]) -> Result<()>;

    /// Returns the identifiers of items matching `restriction`.
    fn search(&self, restriction: &Restriction) -> Result<Vec<ItemId>>;
}

/// Metadata storer of a backend without metadata capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetadataStorer;

impl NullMetadataStorer {
    const fn unsupported(operation: &'static str) -> Error {
        Error::unsupported(Capability::Metadata, operation)
    }

    /// Shared failure for adapters that store metadata but cannot search it.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::CapabilityUnsupported`].
    pub fn search_unsupported() -> Result<Vec<ItemId>> {
        Err(Error::unsupported(Capability::Search, "metadata_search"))
    }
}

impl MetadataStorer for NullMetadataStorer {
    fn retrieve(&self, _id: &ItemId, _selection: &[PropertyId]) -> Result<MetadataSet> {
        Err(Self::unsupported("retrieve"))
    }

    fn update(&self, _id: &ItemId, _properties: &[Property]) -> Result<()> {
        Err(Self::unsupported("update"))
    }

    fn delete(&self, _id: &ItemId, _property_ids: &[PropertyId]) -> Result<()> {
        Err(Self::unsupported("delete"))
    }

    fn search(&self, _restriction: &Restriction) -> Result<Vec<ItemId>> {
        Err(Self::unsupported("search"))
    }
}
