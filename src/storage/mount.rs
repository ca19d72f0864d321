//! Repository mounts.
//!
//! A [`Mount`] bundles the four capability storers of one configured backend
//! with the pool they share. Capabilities the backend lacks are filled with
//! the `Null*` storers, so callers never need to know which backend serves a
//! mount.

use super::adapters::git::GitStore;
use super::adapters::index::IndexStore;
use super::adapters::sqlite::SqliteStore;
use super::adapters::webdav::{WebdavConfig, WebdavStore};
use super::pool::{PoolControl, PoolStatus};
use super::traits::{
    DataStorer, MetadataStorer, NullDataStorer, NullMetadataStorer, NullPrivilegeStorer,
    NullSearchStorer, PrivilegeStorer, SearchStorer,
};
use crate::Result;
use crate::config::{BackendKind, MountConfig};
use std::fmt;
use std::sync::Arc;

/// The storers of one repository mount.
pub struct Mount {
    name: String,
    backend: BackendKind,
    data: Box<dyn DataStorer>,
    metadata: Box<dyn MetadataStorer>,
    privileges: Box<dyn PrivilegeStorer>,
    search: Box<dyn SearchStorer>,
    pool: Arc<dyn PoolControl>,
}

impl Mount {
    /// Display name of the mount.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend serving the mount.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Content and structure.
    #[must_use]
    pub fn data(&self) -> &dyn DataStorer {
        self.data.as_ref()
    }

    /// Item properties.
    #[must_use]
    pub fn metadata(&self) -> &dyn MetadataStorer {
        self.metadata.as_ref()
    }

    /// Access-control lists.
    #[must_use]
    pub fn privileges(&self) -> &dyn PrivilegeStorer {
        self.privileges.as_ref()
    }

    /// Index-backed search.
    #[must_use]
    pub fn search(&self) -> &dyn SearchStorer {
        self.search.as_ref()
    }

    /// Occupancy of the mount's connection pool.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Closes the pool. Operations started afterwards fail with
    /// [`Error::Connection`](crate::Error::Connection).
    pub fn disconnect(&self) {
        tracing::info!(mount = %self.name, backend = %self.backend, "Disconnecting mount");
        self.pool.close();
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.pool.close();
    }
}

/// Builds the mount described by `config`.
///
/// # Backend Routing
///
/// | Backend | Data | Metadata | Privileges | Search |
/// |---------|------|----------|------------|--------|
/// | `sqlite` | object store | attribute rows | ACL rows | null |
/// | `index` | null | null | null | FTS5 over `index_fields` |
/// | `git` | working tree | notes | null | null |
/// | `webdav` | HTTP resources | dead property | null | null |
///
/// No connection is opened; the first operation establishes one.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`](crate::Error::InvalidIdentifier) for a
/// malformed WebDAV base URL or an unusable index field list, and
/// [`Error::Connection`](crate::Error::Connection) if the HTTP client cannot
/// be built.
pub fn connect(config: &MountConfig) -> Result<Mount> {
    let pool_config = config.pool_config();
    let name = config.name.clone();
    let backend = config.backend;

    let mount = match backend {
        BackendKind::Sqlite => {
            let owner = config.credentials.as_ref().map(|c| c.username.clone());
            let store = SqliteStore::new(config.local_path(), pool_config, owner);
            Mount {
                name,
                backend,
                data: Box::new(store.data()),
                metadata: Box::new(store.metadata()),
                privileges: Box::new(store.privileges()),
                search: Box::new(NullSearchStorer),
                pool: store.pool(),
            }
        },
        BackendKind::Index => {
            let store = IndexStore::new(config.local_path(), config.index_fields.clone(), pool_config)?;
            Mount {
                name,
                backend,
                data: Box::new(NullDataStorer),
                metadata: Box::new(NullMetadataStorer),
                privileges: Box::new(NullPrivilegeStorer),
                search: Box::new(store.searcher()),
                pool: store.pool(),
            }
        },
        BackendKind::Git => {
            let store = GitStore::new(config.local_path(), pool_config);
            Mount {
                name,
                backend,
                data: Box::new(store.data()),
                metadata: Box::new(store.metadata()),
                privileges: Box::new(NullPrivilegeStorer),
                search: Box::new(NullSearchStorer),
                pool: store.pool(),
            }
        },
        BackendKind::WebDav => {
            let store = WebdavStore::new(WebdavConfig::from_mount(config)?, pool_config)?;
            Mount {
                name,
                backend,
                data: Box::new(store.data()),
                metadata: Box::new(store.metadata()),
                privileges: Box::new(NullPrivilegeStorer),
                search: Box::new(NullSearchStorer),
                pool: store.pool(),
            }
        },
    };

    tracing::info!(
        mount = %mount.name,
        backend = %mount.backend,
        max_connections = mount.status().max_connections,
        "Mount configured"
    );
    Ok(mount)
}
