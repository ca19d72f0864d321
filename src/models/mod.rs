//! Data models for mountstore.
//!
//! This module contains the backend-neutral types that cross the storage
//! boundary: item identifiers, properties, restrictions and access-control
//! lists.

mod item;
mod privilege;
mod property;
mod restriction;

pub use item::{ItemId, ItemKind};
pub use privilege::{AccessControlEntry, AccessControlList, Principal, PrincipalType, Privilege};
pub use property::{
    MetadataSet, Property, PropertyId, PropertyOrigin, PropertyType, PropertyValue, system,
};
pub use restriction::{Condition, Operator, Restriction};
