//! # Mountstore
//!
//! A uniform persistence layer for a logical item tree.
//!
//! Callers work with logical item paths and property maps. A repository mount
//! decides which backend stores them: a WebDAV server, a git working tree, a
//! `SQLite` object store or a precomputed full-text index. Every backend is
//! reached through the same four capability traits and reports failures through
//! the same [`Error`] taxonomy.
//!
//! ## Features
//!
//! - Capability traits (`DataStorer`, `MetadataStorer`, `PrivilegeStorer`,
//!   `SearchStorer`) with always-failing null implementations
//! - Bounded, lazily connecting connection pool shared by all adapters of a mount
//! - Lossless property value mapping into JSON property bags or fixed attributes
//! - Backend-neutral search restrictions compiled to SQL or FTS5 queries
//!
//! ## Example
//!
//! ```rust,ignore
//! use mountstore::config::MountConfig;
//! use mountstore::models::{ItemId, Property, PropertyValue};
//! use mountstore::storage::connect;
//!
//! let config = MountConfig::from_toml_str(r#"
//!     name = "local"
//!     backend = "sqlite"
//!     base_uri = "/var/lib/mountstore/objects.db"
//! "#)?;
//! let mount = connect(&config)?;
//! let id = ItemId::parse("/a/b.txt")?;
//! mount.data().write(&id, &mut "hello".as_bytes())?;
//! mount.metadata().update(&id, &[Property::new("format", PropertyValue::from("TEXT"))])?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::fmt;
use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod storage;

pub use config::{BackendKind, Credentials, MountConfig, PoolConfig};
pub use models::{
    AccessControlList, ItemId, ItemKind, MetadataSet, Property, PropertyId, PropertyType,
    PropertyValue, Restriction,
};
pub use storage::{
    ConnectionPool, DataStorer, MetadataStorer, Mount, PrivilegeStorer, SearchStorer, connect,
};

/// Capability an item or backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Reading and writing item content and structure.
    Data,
    /// Reading and writing item properties.
    Metadata,
    /// Reading and writing access-control lists.
    Privileges,
    /// Index-backed search.
    Search,
}

impl Capability {
    /// Returns the capability as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Metadata => "metadata",
            Self::Privileges => "privileges",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for every persistence operation.
///
/// This is the only error shape that leaves an adapter. Backend-native
/// failures (`rusqlite`, `git2`, HTTP transport, I/O) are classified into one
/// of these variants at the point of the call, see [`storage::normalize`].
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Connection` | Session cannot be established, pool closed, acquire timed out |
/// | `Authentication` | Credentials rejected, unsupported challenge scheme |
/// | `CapabilityUnsupported` | Operation invoked on a null capability |
/// | `MetadataFormat` | Stored property data cannot be decoded |
/// | `QueryUnsupported` | A restriction cannot be compiled for the backend |
/// | `ItemNotFound` | The referenced item does not exist |
/// | `InvalidIdentifier` | A logical path or property identifier is malformed |
/// | `Persistence` | Any other backend failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A backend session could not be established or maintained.
    #[error("connection to '{backend}' failed: {cause}")]
    Connection {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// Credentials were rejected or the challenge handshake failed.
    ///
    /// Carries the challenge scheme and realm so a caller can prompt for new
    /// credentials.
    #[error("authentication failed (scheme '{scheme}'): {cause}")]
    Authentication {
        /// Challenge scheme offered by the server (`Basic`, `Digest`, ...).
        scheme: String,
        /// Protection realm, if the server announced one.
        realm: Option<String>,
        /// The underlying cause.
        cause: String,
    },

    /// The requested capability is not meaningful for this backend.
    #[error("capability '{capability}' is not supported (operation '{operation}')")]
    CapabilityUnsupported {
        /// The missing capability.
        capability: Capability,
        /// The operation that was invoked.
        operation: &'static str,
    },

    /// Native metadata could not be parsed into the property model.
    #[error("malformed metadata for property '{property}': {cause}")]
    MetadataFormat {
        /// The property identifier (or `*` for a whole document).
        property: String,
        /// The underlying cause.
        cause: String,
    },

    /// A search restriction cannot be compiled for this backend.
    #[error("query not supported: {reason}")]
    QueryUnsupported {
        /// Why compilation was rejected.
        reason: String,
    },

    /// The referenced item does not exist.
    #[error("item not found: {id}")]
    ItemNotFound {
        /// The logical item path.
        id: String,
    },

    /// A logical path or property identifier is malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Any other backend failure, with the original cause kept as text.
    #[error("operation '{operation}' failed: {cause}")]
    Persistence {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Flat discriminant of [`Error`] for uniform handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Connection`].
    Connection,
    /// See [`Error::Authentication`].
    Authentication,
    /// See [`Error::CapabilityUnsupported`].
    CapabilityUnsupported,
    /// See [`Error::MetadataFormat`].
    MetadataFormat,
    /// See [`Error::QueryUnsupported`].
    QueryUnsupported,
    /// See [`Error::ItemNotFound`].
    ItemNotFound,
    /// See [`Error::InvalidIdentifier`].
    InvalidIdentifier,
    /// See [`Error::Persistence`].
    Persistence,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::CapabilityUnsupported { .. } => ErrorKind::CapabilityUnsupported,
            Self::MetadataFormat { .. } => ErrorKind::MetadataFormat,
            Self::QueryUnsupported { .. } => ErrorKind::QueryUnsupported,
            Self::ItemNotFound { .. } => ErrorKind::ItemNotFound,
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Builds a [`Error::CapabilityUnsupported`] error.
    #[must_use]
    pub const fn unsupported(capability: Capability, operation: &'static str) -> Self {
        Self::CapabilityUnsupported {
            capability,
            operation,
        }
    }

    /// Builds a [`Error::ItemNotFound`] error.
    #[must_use]
    pub fn not_found(id: &ItemId) -> Self {
        Self::ItemNotFound {
            id: id.as_str().to_string(),
        }
    }

    /// Builds a [`Error::QueryUnsupported`] error.
    #[must_use]
    pub fn query_unsupported(reason: impl Into<String>) -> Self {
        Self::QueryUnsupported {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::MetadataFormat`] error.
    #[must_use]
    pub fn metadata_format(property: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::MetadataFormat {
            property: property.into(),
            cause: cause.into(),
        }
    }

    /// Builds a catch-all [`Error::Persistence`] error.
    #[must_use]
    pub fn persistence(operation: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Persistence {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, Error>;
