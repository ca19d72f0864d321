//! Challenge/response authentication.
//!
//! A session starts unauthenticated. When the server answers `401` it offers
//! one or more challenges in `WWW-Authenticate` (several headers, or several
//! challenges in one header); the session builds an [`Authorizer`] for the
//! first supported scheme and retries once.
//!
//! | Scheme | Support |
//! |--------|---------|
//! | `Basic` | realm taken from the challenge |
//! | `Digest` | `MD5` / `SHA-256`, `qop=auth` or legacy (no qop) |
//! | anything else | [`Error::Authentication`] |

use crate::config::Credentials;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::Md5;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

static CHALLENGE_PARAM: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^\s,]+))"#).ok());

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Scheme name as sent by the server.
    pub scheme: String,
    /// Lower-cased parameter names with unquoted values.
    pub params: HashMap<String, String>,
}

impl Challenge {
    /// Parses a challenge header value.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let header = header.trim();
        let (scheme, rest) = header
            .split_once(char::is_whitespace)
            .unwrap_or((header, ""));
        let mut params = HashMap::new();
        if let Some(re) = CHALLENGE_PARAM.as_ref() {
            for caps in re.captures_iter(rest) {
                let name = caps[1].to_ascii_lowercase();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().replace("\\\"", "\""))
                    .unwrap_or_default();
                params.insert(name, value);
            }
        }
        Self {
            scheme: scheme.to_string(),
            params,
        }
    }

    /// Parses every challenge in a header value, in order.
    ///
    /// `Negotiate, Basic realm="x"` yields two challenges; commas inside
    /// quoted parameter values do not split.
    #[must_use]
    pub fn parse_all(header: &str) -> Vec<Self> {
        let mut chunks: Vec<String> = Vec::new();
        for item in split_list(header) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match chunks.last_mut() {
                Some(current) if !starts_challenge(item) => {
                    current.push_str(", ");
                    current.push_str(item);
                },
                _ => chunks.push(item.to_string()),
            }
        }
        chunks.iter().map(|chunk| Self::parse(chunk)).collect()
    }

    fn is_supported(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("basic") || self.scheme.eq_ignore_ascii_case("digest")
    }

    /// Protection realm, if announced.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.params.get("realm").map(String::as_str)
    }

    /// Returns true if the server marked the previous nonce as stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.params
            .get("stale")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Splits a header list on commas outside quoted strings.
fn split_list(header: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                items.push(&header[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    items.push(&header[start..]);
    items
}

/// Returns true if a list item opens a new challenge rather than adding a
/// parameter (`name=value`) to the previous one.
fn starts_challenge(item: &str) -> bool {
    let end = item
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(item.len());
    end > 0 && !item[end..].trim_start().starts_with('=')
}

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// `MD5` (the default when the challenge names none).
    Md5,
    /// `SHA-256`.
    Sha256,
}

impl DigestAlgorithm {
    fn parse(name: Option<&str>) -> Option<Self> {
        match name.map(str::to_ascii_uppercase).as_deref() {
            None | Some("MD5") => Some(Self::Md5),
            Some("SHA-256") => Some(Self::Sha256),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }

    fn hash(self, data: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }
}

/// Inputs of one digest computation.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    /// Hash algorithm.
    pub algorithm: DigestAlgorithm,
    /// User name.
    pub username: &'a str,
    /// Password.
    pub password: &'a str,
    /// Realm from the challenge.
    pub realm: &'a str,
    /// Server nonce.
    pub nonce: &'a str,
    /// Request method.
    pub method: &'a str,
    /// Request URI (path and query).
    pub uri: &'a str,
    /// `Some("auth")` for `qop=auth`, `None` for legacy digest.
    pub qop: Option<&'a str>,
    /// Nonce count, formatted as eight hex digits.
    pub nc: u32,
    /// Client nonce.
    pub cnonce: &'a str,
}

/// Computes the `response` value of a digest authorization.
#[must_use]
pub fn digest_response(input: &DigestInput<'_>) -> String {
    let alg = input.algorithm;
    let ha1 = alg.hash(&format!("{}:{}:{}", input.username, input.realm, input.password));
    let ha2 = alg.hash(&format!("{}:{}", input.method, input.uri));
    match input.qop {
        Some(qop) => alg.hash(&format!(
            "{ha1}:{}:{:08x}:{}:{qop}:{ha2}",
            input.nonce, input.nc, input.cnonce
        )),
        None => alg.hash(&format!("{ha1}:{}:{ha2}", input.nonce)),
    }
}

/// Produces the `Authorization` header of a session.
#[derive(Debug, Clone)]
pub enum Authorizer {
    /// No credentials required.
    Anonymous,
    /// `Basic` scheme.
    Basic {
        /// Precomputed header value.
        header: String,
        /// Realm from the challenge.
        realm: Option<String>,
    },
    /// `Digest` scheme.
    Digest(DigestState),
}

/// Negotiated digest parameters and the running nonce count.
#[derive(Debug, Clone)]
pub struct DigestState {
    username: String,
    password: String,
    realm: String,
    nonce: String,
    opaque: Option<String>,
    qop: Option<String>,
    algorithm: DigestAlgorithm,
    nc: u32,
}

impl Authorizer {
    /// Builds an authorizer answering `challenge_header`.
    ///
    /// # Errors
    ///
    /// See [`Authorizer::from_challenges`].
    pub fn from_challenge(challenge_header: &str, credentials: Option<&Credentials>) -> Result<Self> {
        Self::from_challenges([challenge_header], credentials)
    }

    /// Builds an authorizer for the first supported challenge among all
    /// `WWW-Authenticate` header values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if there is no challenge, no
    /// credentials are configured, no offered scheme is supported, or a
    /// digest challenge lacks a nonce.
    pub fn from_challenges<'a, I>(headers: I, credentials: Option<&Credentials>) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let challenges: Vec<Challenge> = headers.into_iter().flat_map(Challenge::parse_all).collect();
        let challenge = challenges
            .iter()
            .find(|c| c.is_supported())
            .or_else(|| challenges.first())
            .ok_or_else(|| Error::Authentication {
                scheme: "unknown".to_string(),
                realm: None,
                cause: "401 without WWW-Authenticate challenge".to_string(),
            })?;
        Self::for_challenge(challenge, credentials)
    }

    fn for_challenge(challenge: &Challenge, credentials: Option<&Credentials>) -> Result<Self> {
        let fail = |cause: String| Error::Authentication {
            scheme: challenge.scheme.clone(),
            realm: challenge.realm().map(String::from),
            cause,
        };
        let credentials =
            credentials.ok_or_else(|| fail("server requires credentials, none configured".to_string()))?;
        let password = credentials.password.expose_secret();

        if challenge.scheme.eq_ignore_ascii_case("basic") {
            let token = STANDARD.encode(format!("{}:{password}", credentials.username));
            return Ok(Self::Basic {
                header: format!("Basic {token}"),
                realm: challenge.realm().map(String::from),
            });
        }
        if challenge.scheme.eq_ignore_ascii_case("digest") {
            let nonce = challenge
                .params
                .get("nonce")
                .cloned()
                .ok_or_else(|| fail("digest challenge without nonce".to_string()))?;
            let algorithm = DigestAlgorithm::parse(challenge.params.get("algorithm").map(String::as_str))
                .ok_or_else(|| fail("unsupported digest algorithm".to_string()))?;
            let qop = match challenge.params.get("qop") {
                None => None,
                Some(offered) if offered.split(',').any(|q| q.trim() == "auth") => {
                    Some("auth".to_string())
                },
                Some(offered) => return Err(fail(format!("unsupported qop '{offered}'"))),
            };
            return Ok(Self::Digest(DigestState {
                username: credentials.username.clone(),
                password: password.to_string(),
                realm: challenge.realm().unwrap_or_default().to_string(),
                nonce,
                opaque: challenge.params.get("opaque").cloned(),
                qop,
                algorithm,
                nc: 0,
            }));
        }
        Err(fail(format!(
            "authentication scheme '{}' is not supported",
            challenge.scheme
        )))
    }

    /// Scheme name, for errors.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Anonymous => "none",
            Self::Basic { .. } => "Basic",
            Self::Digest(_) => "Digest",
        }
    }

    /// Realm, for errors.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Basic { realm, .. } => realm.as_deref(),
            Self::Digest(state) => Some(&state.realm),
        }
    }

    /// Returns the `Authorization` header value for a request, if any.
    pub fn authorize(&mut self, method: &str, uri: &str) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { header, .. } => Some(header.clone()),
            Self::Digest(state) => {
                state.nc = state.nc.wrapping_add(1);
                let cnonce = uuid::Uuid::new_v4().simple().to_string();
                let response = digest_response(&DigestInput {
                    algorithm: state.algorithm,
                    username: &state.username,
                    password: &state.password,
                    realm: &state.realm,
                    nonce: &state.nonce,
                    method,
                    uri,
                    qop: state.qop.as_deref(),
                    nc: state.nc,
                    cnonce: &cnonce,
                });
                let mut header = format!(
                    r#"Digest username="{}", realm="{}", nonce="{}", uri="{uri}", algorithm={}, response="{response}""#,
                    state.username,
                    state.realm,
                    state.nonce,
                    state.algorithm.as_str()
                );
                if let Some(qop) = &state.qop {
                    header.push_str(&format!(r#", qop={qop}, nc={:08x}, cnonce="{cnonce}""#, state.nc));
                }
                if let Some(opaque) = &state.opaque {
                    header.push_str(&format!(r#", opaque="{opaque}""#));
                }
                Some(header)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2617_digest_example() {
        let response = digest_response(&DigestInput {
            algorithm: DigestAlgorithm::Md5,
            username: "Mufasa",
            password: "Circle Of Life",
            realm: "testrealm@host.com",
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            method: "GET",
            uri: "/dir/index.html",
            qop: Some("auth"),
            nc: 1,
            cnonce: "0a4f113b",
        });
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn test_parse_challenge() {
        let c = Challenge::parse(
            r#"Digest realm="dav@example.org", qop="auth,auth-int", nonce="abc", stale=TRUE, algorithm=MD5"#,
        );
        assert_eq!(c.scheme, "Digest");
        assert_eq!(c.realm(), Some("dav@example.org"));
        assert_eq!(c.params.get("qop").map(String::as_str), Some("auth,auth-int"));
        assert!(c.is_stale());
    }

    #[test]
    fn test_parse_all_splits_combined_challenges() {
        let all = Challenge::parse_all(
            r#"Negotiate, Digest realm="a, b", nonce="n", qop="auth,auth-int", Basic realm="x""#,
        );
        let schemes: Vec<&str> = all.iter().map(|c| c.scheme.as_str()).collect();
        assert_eq!(schemes, ["Negotiate", "Digest", "Basic"]);
        assert_eq!(all[1].realm(), Some("a, b"));
        assert_eq!(all[1].params.get("qop").map(String::as_str), Some("auth,auth-int"));
        assert_eq!(all[2].realm(), Some("x"));
        assert!(Challenge::parse_all("  ").is_empty());
    }

    #[test]
    fn test_first_supported_challenge_is_answered() {
        let creds = Credentials::new("Aladdin", "open sesame");
        let auth = Authorizer::from_challenge(r#"Negotiate, Basic realm="repo""#, Some(&creds)).unwrap();
        assert_eq!(auth.scheme(), "Basic");
        assert_eq!(auth.realm(), Some("repo"));

        let auth = Authorizer::from_challenges(
            ["NTLM", r#"Digest realm="r", nonce="n""#],
            Some(&creds),
        )
        .unwrap();
        assert_eq!(auth.scheme(), "Digest");

        let none: [&str; 0] = [];
        let err = Authorizer::from_challenges(none, Some(&creds)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authentication);
    }

    #[test]
    fn test_basic_header() {
        let creds = Credentials::new("Aladdin", "open sesame");
        let mut auth = Authorizer::from_challenge(r#"Basic realm="WallyWorld""#, Some(&creds)).unwrap();
        assert_eq!(auth.realm(), Some("WallyWorld"));
        assert_eq!(
            auth.authorize("GET", "/").as_deref(),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
    }

    #[test]
    fn test_digest_header_counts_nonces() {
        let creds = Credentials::new("u", "p");
        let mut auth =
            Authorizer::from_challenge(r#"Digest realm="r", nonce="n", qop="auth", opaque="o""#, Some(&creds))
                .unwrap();
        let first = auth.authorize("PROPFIND", "/dav/").unwrap();
        let second = auth.authorize("PROPFIND", "/dav/").unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));
        assert!(first.contains(r#"opaque="o""#));
        assert!(first.starts_with(r#"Digest username="u", realm="r""#));
    }

    #[test]
    fn test_unsupported_scheme_and_missing_credentials() {
        let creds = Credentials::new("u", "p");
        let err = Authorizer::from_challenge(r#"Negotiate realm="corp""#, Some(&creds)).unwrap_err();
        match err {
            Error::Authentication { scheme, realm, .. } => {
                assert_eq!(scheme, "Negotiate");
                assert_eq!(realm.as_deref(), Some("corp"));
            },
            other => panic!("unexpected error {other:?}"),
        }
        let err = Authorizer::from_challenge(r#"Basic realm="x""#, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authentication);
    }
}
