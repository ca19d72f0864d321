//! WebDAV store.
//!
//! Items map onto resources below a base collection URL. Properties are one
//! JSON property bag per resource, kept in the dead property
//! `{urn:mountstore:}propertybag`.
//!
//! Each pooled session is authenticated once, during
//! [`create_connection`](crate::storage::pool::ConnectionFactory::create_connection):
//!
//! ```text
//! PROPFIND base (Depth 0) ──2xx──► anonymous session
//!          │ 401 + WWW-Authenticate
//!          ▼
//!   build Basic / Digest authorizer ──► retry once ──2xx──► session
//!                                              │ 401
//!                                              ▼
//!                                  Error::Authentication { scheme, realm }
//! ```

mod auth;
mod data;
mod metadata;
mod multistatus;
#[cfg(test)]
mod testing;
mod transport;

pub use auth::{Authorizer, Challenge, DigestAlgorithm, DigestInput, digest_response};
pub use data::WebdavDataStorer;
pub use metadata::WebdavMetadataStorer;
pub use multistatus::{BAG_NAMESPACE, BAG_PROPERTY, DavEntry, parse_multistatus};
pub use transport::{
    DavRequest, DavResponse, HttpTransport, ReqwestTransport, TransportError, TransportErrorKind,
};

use crate::config::{Credentials, MountConfig, PoolConfig};
use crate::models::ItemId;
use crate::storage::adapters::encode_relative;
use crate::storage::normalize::{Context, HttpStatus};
use crate::storage::pool::{ConnectionFactory, ConnectionPool};
use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::sync::Arc;

pub(crate) const BACKEND: &str = "webdav";

/// Connection settings of a WebDAV mount.
#[derive(Debug, Clone)]
pub struct WebdavConfig {
    scheme: String,
    host: String,
    port: u16,
    base_path: String,
    credentials: Option<Credentials>,
    user_collection_url: Option<String>,
    group_collection_url: Option<String>,
}

impl WebdavConfig {
    /// Parses a base URL such as `https://dav.example.org/repo/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the URL is malformed, not
    /// `http`/`https`, or has no host.
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| Error::InvalidIdentifier(format!("'{base_url}': {e}")))?;
        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(Error::InvalidIdentifier(format!(
                "'{base_url}' is not an http(s) URL"
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidIdentifier(format!("'{base_url}' has no host")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidIdentifier(format!("'{base_url}' has no port")))?;
        let mut base_path = url.path().to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Ok(Self {
            scheme,
            host,
            port,
            base_path,
            credentials,
            user_collection_url: None,
            group_collection_url: None,
        })
    }

    /// Builds the settings of a mount record.
    ///
    /// # Errors
    ///
    /// See [`WebdavConfig::new`].
    pub fn from_mount(config: &MountConfig) -> Result<Self> {
        let mut dav = Self::new(&config.base_uri, config.credentials.clone())?;
        dav.user_collection_url.clone_from(&config.user_collection_url);
        dav.group_collection_url.clone_from(&config.group_collection_url);
        Ok(dav)
    }

    /// URL scheme (`http` or `https`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Base collection path, always ending in `/`.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Collection listing users, if configured.
    #[must_use]
    pub fn user_collection_url(&self) -> Option<&str> {
        self.user_collection_url.as_deref()
    }

    /// Collection listing groups, if configured.
    #[must_use]
    pub fn group_collection_url(&self) -> Option<&str> {
        self.group_collection_url.as_deref()
    }

    fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Request path of an item. Collections get a trailing `/`.
    #[must_use]
    pub fn path_for(&self, id: &ItemId, collection: bool) -> String {
        let mut path = format!("{}{}", self.base_path, encode_relative(id));
        if collection && !path.ends_with('/') {
            path.push('/');
        }
        path
    }

    /// Absolute URL of an item.
    #[must_use]
    pub fn url_for(&self, id: &ItemId, collection: bool) -> String {
        format!("{}{}", self.origin(), self.path_for(id, collection))
    }

    /// Maps an href of a multistatus answer back to an item.
    ///
    /// Returns `None` for hrefs outside the base collection.
    #[must_use]
    pub fn id_for_href(&self, href: &str) -> Option<ItemId> {
        let path = Url::parse(href).map_or_else(|_| href.to_string(), |url| url.path().to_string());
        let decoded = percent_decode_str(&path).decode_utf8().ok()?;
        let base = percent_decode_str(&self.base_path).decode_utf8().ok()?;
        let rest = if decoded.trim_end_matches('/') == base.trim_end_matches('/') {
            ""
        } else {
            decoded.strip_prefix(base.as_ref())?
        };
        ItemId::from_decoded(&format!("/{rest}")).ok()
    }
}

/// One authenticated WebDAV session.
pub struct WebdavSession {
    transport: Arc<dyn HttpTransport>,
    config: Arc<WebdavConfig>,
    authorizer: Authorizer,
}

/// Path and query of a URL, as used in digest authorization.
fn request_uri(url: &str) -> String {
    Url::parse(url).map_or_else(
        |_| url.to_string(),
        |u| match u.query() {
            Some(q) => format!("{}?{q}", u.path()),
            None => u.path().to_string(),
        },
    )
}

fn send_raw(
    transport: &dyn HttpTransport,
    authorizer: &mut Authorizer,
    request: &DavRequest,
) -> std::result::Result<DavResponse, TransportError> {
    match authorizer.authorize(&request.method, &request_uri(&request.url)) {
        Some(header) => transport.send(&request.clone().header("Authorization", header)),
        None => transport.send(request),
    }
}

fn rejected(authorizer: &Authorizer, cause: impl Into<String>) -> Error {
    Error::Authentication {
        scheme: authorizer.scheme().to_string(),
        realm: authorizer.realm().map(String::from),
        cause: cause.into(),
    }
}

impl WebdavSession {
    /// Settings of the mount this session belongs to.
    #[must_use]
    pub fn config(&self) -> &WebdavConfig {
        &self.config
    }

    /// Sends a request with this session's authorization.
    ///
    /// A digest nonce reported stale is renegotiated once. Every other status
    /// is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the server cannot be reached and
    /// [`Error::Authentication`] if the server rejects the session.
    pub fn send(&mut self, context: Context<'_>, request: &DavRequest) -> Result<DavResponse> {
        let response = send_raw(self.transport.as_ref(), &mut self.authorizer, request)
            .map_err(|e| context.error(&e))?;
        if response.status != 401 {
            return Ok(response);
        }

        let headers = response.header_values("WWW-Authenticate");
        let stale = matches!(self.authorizer, Authorizer::Digest(_))
            && headers
                .iter()
                .flat_map(|header| Challenge::parse_all(header))
                .any(|c| c.scheme.eq_ignore_ascii_case("digest") && c.is_stale());
        if !stale {
            return Err(rejected(&self.authorizer, "credentials rejected"));
        }

        tracing::debug!(backend = BACKEND, "Digest nonce stale, renegotiating");
        self.authorizer =
            Authorizer::from_challenges(headers, self.config.credentials.as_ref())?;
        let retry = send_raw(self.transport.as_ref(), &mut self.authorizer, request)
            .map_err(|e| context.error(&e))?;
        if retry.status == 401 {
            return Err(rejected(&self.authorizer, "credentials rejected"));
        }
        Ok(retry)
    }
}

/// Establishes authenticated sessions for a [`ConnectionPool`].
pub struct WebdavSessionFactory {
    config: Arc<WebdavConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl WebdavSessionFactory {
    /// Creates a factory sending through `transport`.
    #[must_use]
    pub fn new(config: WebdavConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    fn probe(&self) -> DavRequest {
        DavRequest::new("PROPFIND", self.config.url_for(&ItemId::root(), true))
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(multistatus::propfind_body())
    }

    fn connection_error(cause: impl Into<String>) -> Error {
        Error::Connection {
            backend: BACKEND.to_string(),
            cause: cause.into(),
        }
    }

    fn check_probe(response: &DavResponse) -> Result<()> {
        if response.is_success() {
            Ok(())
        } else {
            Err(Self::connection_error(format!(
                "base collection probe: {}",
                HttpStatus(response.status)
            )))
        }
    }
}

impl ConnectionFactory for WebdavSessionFactory {
    type Connection = WebdavSession;

    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn create_connection(&self) -> Result<WebdavSession> {
        let probe = self.probe();
        let mut authorizer = Authorizer::Anonymous;
        let response = self
            .transport
            .send(&probe)
            .map_err(|e| Self::connection_error(format!("connect: {e}")))?;

        if response.status == 401 {
            authorizer = Authorizer::from_challenges(
                response.header_values("WWW-Authenticate"),
                self.config.credentials.as_ref(),
            )?;
            let retry = send_raw(self.transport.as_ref(), &mut authorizer, &probe)
                .map_err(|e| Self::connection_error(format!("connect: {e}")))?;
            if retry.status == 401 {
                return Err(rejected(&authorizer, "credentials rejected"));
            }
            Self::check_probe(&retry)?;
        } else {
            Self::check_probe(&response)?;
        }

        tracing::info!(
            backend = BACKEND,
            host = %self.config.host,
            scheme = authorizer.scheme(),
            "Established WebDAV session"
        );
        Ok(WebdavSession {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
            authorizer,
        })
    }
}

/// Handle to one WebDAV mount, shared by its storers.
#[derive(Clone)]
pub struct WebdavStore {
    pool: Arc<ConnectionPool<WebdavSessionFactory>>,
    config: Arc<WebdavConfig>,
}

impl WebdavStore {
    /// Creates a store over the default HTTP transport. No request is sent
    /// until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(config: WebdavConfig, pool: PoolConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT)
            .map_err(|e| WebdavSessionFactory::connection_error(format!("http client: {e}")))?;
        Ok(Self::with_transport(config, pool, Arc::new(transport)))
    }

    /// Creates a store sending through `transport`.
    #[must_use]
    pub fn with_transport(
        config: WebdavConfig,
        pool: PoolConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let factory = WebdavSessionFactory::new(config, transport);
        let config = Arc::clone(&factory.config);
        Self {
            pool: Arc::new(ConnectionPool::new(factory, pool)),
            config,
        }
    }

    /// Returns the shared pool.
    #[must_use]
    pub fn pool(&self) -> Arc<ConnectionPool<WebdavSessionFactory>> {
        Arc::clone(&self.pool)
    }

    /// Settings of this mount.
    #[must_use]
    pub fn config(&self) -> &WebdavConfig {
        &self.config
    }

    /// Data storer over this mount.
    #[must_use]
    pub fn data(&self) -> WebdavDataStorer {
        WebdavDataStorer::new(self.clone())
    }

    /// Metadata storer over this mount.
    #[must_use]
    pub fn metadata(&self) -> WebdavMetadataStorer {
        WebdavMetadataStorer::new(self.clone())
    }
}

/// Fails unless `response` carries a 2xx status.
pub(crate) fn expect_success(context: Context<'_>, response: DavResponse) -> Result<DavResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(context.error(&HttpStatus(response.status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    fn config() -> WebdavConfig {
        WebdavConfig::new("https://dav.example.org/repo", None).unwrap()
    }

    #[test]
    fn test_base_url_split() {
        let config = config();
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.host(), "dav.example.org");
        assert_eq!(config.port(), 443);
        assert_eq!(config.base_path(), "/repo/");

        let local = WebdavConfig::new("http://localhost:8080/", None).unwrap();
        assert_eq!(local.port(), 8080);
        assert_eq!(local.base_path(), "/");
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(WebdavConfig::new("ftp://example.org/", None).is_err());
        assert!(WebdavConfig::new("not a url", None).is_err());
    }

    #[test]
    fn test_item_urls() {
        let config = config();
        let id = ItemId::parse("/docs/a b.txt").unwrap();
        assert_eq!(
            config.url_for(&id, false),
            "https://dav.example.org:443/repo/docs/a%20b.txt"
        );
        assert_eq!(config.path_for(&ItemId::root(), true), "/repo/");
        assert_eq!(
            config.path_for(&ItemId::parse("/docs").unwrap(), true),
            "/repo/docs/"
        );
    }

    #[test]
    fn test_href_to_id() {
        let config = config();
        assert_eq!(config.id_for_href("/repo/"), Some(ItemId::root()));
        assert_eq!(config.id_for_href("/repo"), Some(ItemId::root()));
        assert_eq!(
            config.id_for_href("https://dav.example.org/repo/docs/a%20b.txt"),
            Some(ItemId::parse("/docs/a b.txt").unwrap())
        );
        assert_eq!(
            config.id_for_href("/repo/50%2525/"),
            Some(ItemId::from_decoded("/50%25").unwrap())
        );
        assert_eq!(config.id_for_href("/elsewhere/x"), None);
    }

    #[test]
    fn test_from_mount_keeps_principal_collections() {
        let mut mount = MountConfig::new("shared", BackendKind::WebDav, "http://h/dav/");
        mount.user_collection_url = Some("http://h/principals/users/".to_string());
        let dav = WebdavConfig::from_mount(&mount).unwrap();
        assert_eq!(dav.user_collection_url(), Some("http://h/principals/users/"));
        assert_eq!(dav.group_collection_url(), None);
    }

    #[test]
    fn test_request_uri() {
        assert_eq!(request_uri("http://h:80/dav/a%20b?x=1"), "/dav/a%20b?x=1");
    }
}
