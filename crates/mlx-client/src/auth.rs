//! Authorization header computation for Basic, Digest and Cloud schemes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use tracing::debug;

use crate::params::AuthScheme;

static CNONCE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Parsed `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
}

impl DigestChallenge {
    /// Parse a challenge header. Returns `None` for non-Digest challenges or
    /// when `nonce` is missing.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let params = parse_auth_params(rest);
        let lookup = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        };
        Some(Self {
            realm: lookup("realm").unwrap_or_default(),
            nonce: lookup("nonce")?,
            opaque: lookup("opaque"),
            algorithm: lookup("algorithm"),
            qop: lookup("qop"),
        })
    }

    fn qop_auth(&self) -> Option<&'static str> {
        let qop = self.qop.as_deref()?;
        qop.split(',')
            .map(str::trim)
            .any(|option| option.eq_ignore_ascii_case("auth"))
            .then_some("auth")
    }

    fn is_session_algorithm(&self) -> bool {
        self.algorithm
            .as_deref()
            .is_some_and(|algorithm| algorithm.eq_ignore_ascii_case("MD5-sess"))
    }
}

/// Digest `response` value (RFC 2617).
#[must_use]
pub fn digest_response(
    user: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let mut ha1 = md5_hex(format!("{user}:{}:{password}", challenge.realm).as_bytes());
    if challenge.is_session_algorithm() {
        ha1 = md5_hex(format!("{ha1}:{}:{cnonce}", challenge.nonce).as_bytes());
    }
    let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
    match challenge.qop_auth() {
        Some(qop) => md5_hex(
            format!(
                "{ha1}:{}:{nonce_count:08x}:{cnonce}:{qop}:{ha2}",
                challenge.nonce
            )
            .as_bytes(),
        ),
        None => md5_hex(format!("{ha1}:{}:{ha2}", challenge.nonce).as_bytes()),
    }
}

/// Full `Authorization` header value for a Digest exchange.
#[must_use]
pub fn digest_header(
    user: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let response = digest_response(user, password, method, uri, challenge, nonce_count, cnonce);
    let mut header = format!(
        "Digest username=\"{user}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\"",
        challenge.realm, challenge.nonce
    );
    if let Some(algorithm) = &challenge.algorithm {
        header.push_str(&format!(", algorithm={algorithm}"));
    }
    if let Some(qop) = challenge.qop_auth() {
        header.push_str(&format!(
            ", qop={qop}, nc={nonce_count:08x}, cnonce=\"{cnonce}\""
        ));
    }
    header.push_str(&format!(", response=\"{response}\""));
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    header
}

#[must_use]
pub fn basic_header(user: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}

#[derive(Debug)]
struct DigestState {
    challenge: DigestChallenge,
    nonce_count: u32,
}

/// Per-connection authorization state.
///
/// Digest challenges and Cloud bearer tokens are cached so follow-up requests
/// authenticate preemptively; both are renegotiated after a 401.
#[derive(Debug)]
pub(crate) struct Authenticator {
    scheme: AuthScheme,
    user: String,
    password: String,
    digest: Mutex<Option<DigestState>>,
    bearer: Mutex<Option<String>>,
}

impl Authenticator {
    pub(crate) fn new(scheme: AuthScheme, user: &str, password: &str) -> Self {
        Self {
            scheme,
            user: user.to_string(),
            password: password.to_string(),
            digest: Mutex::new(None),
            bearer: Mutex::new(None),
        }
    }

    pub(crate) fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// API key exchanged for a bearer token under the Cloud scheme.
    pub(crate) fn api_key(&self) -> &str {
        &self.password
    }

    pub(crate) fn needs_token(&self) -> bool {
        self.scheme == AuthScheme::Cloud && self.bearer.lock().is_none()
    }

    pub(crate) fn set_token(&self, token: String) {
        *self.bearer.lock() = Some(token);
    }

    /// Header for the next request, if one can be produced without a round trip.
    pub(crate) fn header(&self, method: &str, uri: &str) -> Option<String> {
        match self.scheme {
            AuthScheme::Basic => Some(basic_header(&self.user, &self.password)),
            AuthScheme::Cloud => self
                .bearer
                .lock()
                .as_ref()
                .map(|token| format!("Bearer {token}")),
            AuthScheme::Digest => {
                let mut guard = self.digest.lock();
                let state = guard.as_mut()?;
                state.nonce_count = state.nonce_count.wrapping_add(1);
                Some(digest_header(
                    &self.user,
                    &self.password,
                    method,
                    uri,
                    &state.challenge,
                    state.nonce_count,
                    &new_cnonce(),
                ))
            }
        }
    }

    /// Record a 401. Returns whether retrying the request may succeed.
    pub(crate) fn on_unauthorized(&self, challenge: Option<&str>) -> bool {
        match self.scheme {
            AuthScheme::Basic => false,
            AuthScheme::Cloud => self.bearer.lock().take().is_some(),
            AuthScheme::Digest => {
                let Some(challenge) = challenge.and_then(DigestChallenge::parse) else {
                    debug!("401 without a usable digest challenge");
                    return false;
                };
                *self.digest.lock() = Some(DigestState {
                    challenge,
                    nonce_count: 0,
                });
                true
            }
        }
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    Md5::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn new_cnonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let seq = CNONCE_SEQ.fetch_add(1, Ordering::Relaxed);
    md5_hex(format!("{nanos}:{seq}").as_bytes())[..16].to_string()
}

/// Split `key=value, key="quoted, value"` pairs.
fn parse_auth_params(text: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
        }
        params.push((key.trim().to_string(), value.trim().to_string()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_challenge() -> DigestChallenge {
        DigestChallenge::parse(
            "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", \
             opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"",
        )
        .unwrap()
    }

    #[test]
    fn parses_digest_challenge() {
        let challenge = rfc_challenge();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(
            challenge.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
        assert_eq!(challenge.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(challenge.algorithm, None);
    }

    #[test]
    fn rejects_non_digest_challenge() {
        assert_eq!(DigestChallenge::parse("Basic realm=\"public\""), None);
        assert_eq!(DigestChallenge::parse("Digest realm=\"no nonce\""), None);
    }

    #[test]
    fn digest_response_matches_rfc_2617_example() {
        let response = digest_response(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &rfc_challenge(),
            1,
            "0a4f113b",
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn digest_header_carries_counters_and_opaque() {
        let header = digest_header(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &rfc_challenge(),
            1,
            "0a4f113b",
        );
        assert!(header.starts_with("Digest username=\"Mufasa\""));
        assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn basic_header_encodes_credentials() {
        assert_eq!(
            basic_header("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn digest_authenticator_waits_for_challenge() {
        let auth = Authenticator::new(AuthScheme::Digest, "u", "p");
        assert_eq!(auth.header("GET", "/"), None);
        assert!(auth.on_unauthorized(Some("Digest realm=\"r\", nonce=\"n\", qop=\"auth\"")));
        let first = auth.header("GET", "/").unwrap();
        let second = auth.header("GET", "/").unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn basic_authenticator_does_not_retry() {
        let auth = Authenticator::new(AuthScheme::Basic, "u", "p");
        assert!(auth.header("GET", "/").is_some());
        assert!(!auth.on_unauthorized(Some("Basic realm=\"r\"")));
    }

    #[test]
    fn cloud_authenticator_drops_token_on_401() {
        let auth = Authenticator::new(AuthScheme::Cloud, "", "key");
        assert!(auth.needs_token());
        auth.set_token("abc".to_string());
        assert_eq!(auth.header("GET", "/").as_deref(), Some("Bearer abc"));
        assert!(auth.on_unauthorized(None));
        assert!(auth.needs_token());
        assert!(!auth.on_unauthorized(None));
    }
}
