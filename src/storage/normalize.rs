//! Error normalization.
//!
//! Every call into a backend library goes through [`Normalize::normalize`],
//! which classifies the native failure and rebuilds it as an [`Error`]. No
//! native error type leaves an adapter.
//!
//! | Native failure | Error |
//! |----------------|-------|
//! | missing file / row / object, HTTP 404 | `ItemNotFound` (when an item is in context) |
//! | refused, reset or timed-out transport, unopenable database, HTTP 502-504 | `Connection` |
//! | rejected credentials, HTTP 401 | `Authentication` |
//! | anything else | `Persistence`, cause kept as text |

use crate::models::ItemId;
use crate::{Error, Result};
use std::fmt;

/// Classification of a native failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The addressed object does not exist.
    NotFound,
    /// The session could not be established or was lost.
    Connection,
    /// Credentials were rejected.
    Authentication,
    /// Anything else.
    Other,
}

/// A backend-native error that can be classified.
pub trait Classify: fmt::Display {
    /// Returns the failure class.
    fn classify(&self) -> FailureClass;
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    backend: &'static str,
    operation: &'static str,
    item: Option<&'a ItemId>,
}

impl<'a> Context<'a> {
    /// Creates a context for a backend operation.
    #[must_use]
    pub const fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            item: None,
        }
    }

    /// Names the item the operation addresses.
    #[must_use]
    pub const fn item(mut self, id: &'a ItemId) -> Self {
        self.item = Some(id);
        self
    }

    /// Builds the normalized error for a native failure.
    pub fn error<E: Classify + ?Sized>(&self, native: &E) -> Error {
        let class = native.classify();
        match (class, self.item) {
            (FailureClass::NotFound, Some(id)) => {
                tracing::debug!(
                    backend = self.backend,
                    operation = self.operation,
                    item = %id,
                    "Item not found"
                );
                return Error::not_found(id);
            },
            (FailureClass::NotFound, None) => {},
            _ => tracing::warn!(
                backend = self.backend,
                operation = self.operation,
                item = self.item.map(ItemId::as_str),
                error = %native,
                "Backend operation failed"
            ),
        }

        let cause = format!("{}: {native}", self.operation);
        match class {
            FailureClass::Connection => Error::Connection {
                backend: self.backend.to_string(),
                cause,
            },
            FailureClass::Authentication => Error::Authentication {
                scheme: "unknown".to_string(),
                realm: None,
                cause,
            },
            FailureClass::NotFound | FailureClass::Other => Error::Persistence {
                operation: self.operation.to_string(),
                cause: format!("{native}"),
            },
        }
    }
}

/// Converts a native `Result` into a normalized one.
pub trait Normalize<T> {
    /// Classifies any failure within `context`.
    ///
    /// # Errors
    ///
    /// Returns the normalized form of the native error.
    fn normalize(self, context: Context<'_>) -> Result<T>;
}

impl<T, E: Classify> Normalize<T> for std::result::Result<T, E> {
    fn normalize(self, context: Context<'_>) -> Result<T> {
        self.map_err(|e| context.error(&e))
    }
}

impl Classify for std::io::Error {
    fn classify(&self) -> FailureClass {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::NotFound => FailureClass::NotFound,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut => FailureClass::Connection,
            _ => FailureClass::Other,
        }
    }
}

impl Classify for rusqlite::Error {
    fn classify(&self) -> FailureClass {
        if matches!(self, Self::QueryReturnedNoRows) {
            return FailureClass::NotFound;
        }
        match self.sqlite_error_code() {
            Some(rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase) => {
                FailureClass::Connection
            },
            _ => FailureClass::Other,
        }
    }
}

impl Classify for git2::Error {
    fn classify(&self) -> FailureClass {
        use git2::{ErrorClass, ErrorCode};
        if self.code() == ErrorCode::NotFound {
            return FailureClass::NotFound;
        }
        if self.code() == ErrorCode::Auth {
            return FailureClass::Authentication;
        }
        match self.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
                FailureClass::Connection
            },
            _ => FailureClass::Other,
        }
    }
}

impl Classify for serde_json::Error {
    fn classify(&self) -> FailureClass {
        if self.is_io() {
            FailureClass::Connection
        } else {
            FailureClass::Other
        }
    }
}

/// An unexpected HTTP response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatus(pub u16);

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected HTTP status {}", self.0)
    }
}

impl Classify for HttpStatus {
    fn classify(&self) -> FailureClass {
        match self.0 {
            401 => FailureClass::Authentication,
            404 | 410 => FailureClass::NotFound,
            502..=504 => FailureClass::Connection,
            _ => FailureClass::Other,
        }
    }
}
