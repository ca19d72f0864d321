//! Storage layer abstraction.
//!
//! This module provides the capability-based persistence layer:
//! - **Traits**: `DataStorer`, `MetadataStorer`, `PrivilegeStorer`, `SearchStorer`
//! - **Pool**: one bounded connection pool per mount, shared by its storers
//! - **Mapping / Query**: property values and restrictions in backend-native form
//! - **Adapters**: `SQLite` object store, FTS5 index, git working tree, WebDAV

// Allow significant_drop_tightening - pooled connections are held for the
// whole operation.
#![allow(clippy::significant_drop_tightening)]
// Allow match_same_arms for explicit enum handling.
#![allow(clippy::match_same_arms)]

pub mod adapters;
pub mod mapping;
pub mod mount;
pub mod normalize;
pub mod pool;
pub mod query;
pub mod traits;

pub use mount::{Mount, connect};
pub use pool::{ConnectionFactory, ConnectionPool, PoolControl, PoolStatus, PooledConnection};
pub use traits::{
    DataStorer, MetadataStorer, NullDataStorer, NullMetadataStorer, NullPrivilegeStorer,
    NullSearchStorer, PrivilegeStorer, SearchStorer,
};
