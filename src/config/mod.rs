//! Mount configuration.
//!
//! A [`MountConfig`] is the per-mount record the repository layer hands to
//! [`crate::storage::connect`]: backend kind, base URI, credentials and pool
//! size. Files are TOML; environment variables override file values.

use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// WebDAV server.
    WebDav,
    /// Git working tree (version-control-backed store).
    Git,
    /// `SQLite` object store.
    Sqlite,
    /// Precomputed full-text index.
    Index,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackendKind {
    /// Returns the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebDav => "webdav",
            Self::Git => "git",
            Self::Sqlite => "sqlite",
            Self::Index => "index",
        }
    }

    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "webdav" | "dav" => Some(Self::WebDav),
            "git" => Some(Self::Git),
            "sqlite" => Some(Self::Sqlite),
            "index" | "fts" => Some(Self::Index),
            _ => None,
        }
    }

    /// Fixed default pool size of the backend type.
    ///
    /// | Backend | Connections |
    /// |---------|-------------|
    /// | WebDAV | 5 |
    /// | `SQLite` | 4 |
    /// | Index | 3 |
    /// | Git | 2 |
    #[must_use]
    pub const fn default_max_connections(&self) -> usize {
        match self {
            Self::WebDav => 5,
            Self::Sqlite => 4,
            Self::Index => 3,
            Self::Git => 2,
        }
    }
}

/// Credentials for backends that authenticate.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password. Never printed by `Debug`.
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// Connection pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum simultaneously live connections.
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection (`None` = forever).
    pub acquire_timeout: Option<Duration>,
}

impl PoolConfig {
    /// Creates a configuration with the given capacity and no acquire timeout.
    #[must_use]
    pub const fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            acquire_timeout: None,
        }
    }

    /// Sets the acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `MOUNTSTORE_POOL_MAX_CONNECTIONS` | Pool capacity (minimum 1) |
    /// | `MOUNTSTORE_POOL_ACQUIRE_TIMEOUT_MS` | Acquire timeout, `0` disables |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MOUNTSTORE_POOL_MAX_CONNECTIONS")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_connections = parsed.max(1);
        }
        if let Ok(v) = std::env::var("MOUNTSTORE_POOL_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout = (parsed > 0).then(|| Duration::from_millis(parsed));
        }
        self
    }
}

/// Pool section as it appears in a configuration file.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PoolSettings {
    /// Pool capacity; defaults to the backend's fixed size.
    pub max_connections: Option<usize>,
    /// Acquire timeout in milliseconds; absent means wait forever.
    pub acquire_timeout_ms: Option<u64>,
}

/// Configuration of one repository mount.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// Display name of the mount.
    pub name: String,
    /// Backend kind.
    pub backend: BackendKind,
    /// Base URI: an `http(s)://` URL for WebDAV, a path or `file://` URI otherwise.
    pub base_uri: String,
    /// Credentials, if the backend authenticates.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Pool settings.
    #[serde(default)]
    pub pool: PoolSettings,
    /// Property identifiers held by a full-text index.
    #[serde(default)]
    pub index_fields: Vec<String>,
    /// Collection listing users (WebDAV principal lookups).
    #[serde(default)]
    pub user_collection_url: Option<String>,
    /// Collection listing groups (WebDAV principal lookups).
    #[serde(default)]
    pub group_collection_url: Option<String>,
}

impl MountConfig {
    /// Creates a configuration with defaults for the given backend.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: BackendKind, base_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend,
            base_uri: base_uri.into(),
            credentials: None,
            pool: PoolSettings::default(),
            index_fields: Vec::new(),
            user_collection_url: None,
            group_collection_url: None,
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the document is not a valid mount record.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::persistence("parse_mount_config", e))
    }

    /// Loads a mount configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::persistence("read_mount_config", e))?;
        Self::from_toml_str(&contents)
    }

    /// Default configuration file location.
    ///
    /// `~/.config/mountstore/mount.toml` on Linux, the platform config
    /// directory elsewhere.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mountstore")
            .map(|dirs| dirs.config_dir().join("mount.toml"))
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `MOUNTSTORE_USERNAME` | User name (requires `MOUNTSTORE_PASSWORD`) |
    /// | `MOUNTSTORE_PASSWORD` | Password |
    ///
    /// Pool variables are applied by [`PoolConfig::with_env_overrides`].
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let (Ok(username), Ok(password)) = (
            std::env::var("MOUNTSTORE_USERNAME"),
            std::env::var("MOUNTSTORE_PASSWORD"),
        ) {
            self.credentials = Some(Credentials::new(username, password));
        }
        self
    }

    /// Sets credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the pool capacity.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.pool.max_connections = Some(max);
        self
    }

    /// Sets the indexed property identifiers.
    #[must_use]
    pub fn with_index_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Effective pool configuration (file values, backend defaults, env overrides).
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        let max = self
            .pool
            .max_connections
            .unwrap_or_else(|| self.backend.default_max_connections())
            .max(1);
        let mut config = PoolConfig::new(max);
        if let Some(ms) = self.pool.acquire_timeout_ms.filter(|ms| *ms > 0) {
            config = config.with_acquire_timeout(Duration::from_millis(ms));
        }
        config.with_env_overrides()
    }

    /// Resolves `base_uri` to a local filesystem path.
    ///
    /// Accepts plain paths and `file://` URIs.
    #[must_use]
    pub fn local_path(&self) -> PathBuf {
        let uri = self.base_uri.as_str();
        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("sqlite://"))
            .unwrap_or(uri);
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_parse_toml() {
        let config = MountConfig::from_toml_str(
            r#"
            name = "shared"
            backend = "webdav"
            base_uri = "https://dav.example.org/repo/"

            [credentials]
            username = "alice"
            password = "s3cret"

            [pool]
            max_connections = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::WebDav);
        let credentials = config.credentials.as_ref().unwrap();
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.password.expose_secret(), "s3cret");
        assert_eq!(config.pool.max_connections, Some(2));
        assert!(!format!("{credentials:?}").contains("s3cret"));
    }

    #[test]
    fn test_pool_defaults_per_backend() {
        let config = MountConfig::new("m", BackendKind::WebDav, "https://x/");
        assert_eq!(config.pool.max_connections, None);
        assert_eq!(BackendKind::WebDav.default_max_connections(), 5);
        assert_eq!(config.pool_config().max_connections, 5);
        assert_eq!(
            config.with_max_connections(0).pool_config().max_connections,
            1
        );
    }

    #[test]
    fn test_local_path() {
        let config = MountConfig::new("m", BackendKind::Git, "file:///srv/repo");
        assert_eq!(config.local_path(), PathBuf::from("/srv/repo"));
        let config = MountConfig::new("m", BackendKind::Sqlite, "/tmp/x.db");
        assert_eq!(config.local_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendKind::parse("WebDAV"), Some(BackendKind::WebDav));
        assert_eq!(BackendKind::parse("fts"), Some(BackendKind::Index));
        assert_eq!(BackendKind::parse("ftp"), None);
    }

    #[test]
    fn test_invalid_toml() {
        let err = MountConfig::from_toml_str("name = 1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Persistence);
    }
}
