//! Validated connection parameters for one server role.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{keys, RawConfig};
use crate::error::{ClientError, ClientResult};

/// Authentication scheme accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    Digest,
    Basic,
    Cloud,
}

impl AuthScheme {
    /// Parse a scheme name. Unrecognized names fall back to [`AuthScheme::Digest`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "BASIC" => Self::Basic,
            "CLOUD" => Self::Cloud,
            _ => Self::Digest,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digest => "DIGEST",
            Self::Basic => "BASIC",
            Self::Cloud => "CLOUD",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of how to reach one server role.
///
/// `port` and `base_path` are the active role's values; the remaining ports
/// and base paths are carried so sibling roles can be derived from the same
/// instance.
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub base_path: String,
    pub manage_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub test_port: Option<u16>,
    pub manage_base_path: String,
    pub admin_base_path: String,
    pub test_base_path: String,
    pub user: String,
    pub password: String,
    pub auth: AuthScheme,
    pub ssl: bool,
    pub path_to_ca: Option<PathBuf>,
    /// PEM content of `path_to_ca`, read once at construction.
    pub ca: Option<String>,
    pub reject_unauthorized: bool,
    /// Empty means the server's default content database.
    pub content_db: String,
    pub modules_db: String,
}

/// Trimmed `pathToCa`, if set.
pub(crate) fn ca_path(raw: &RawConfig) -> Option<PathBuf> {
    raw.get_string(keys::PATH_TO_CA)
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

pub(crate) fn read_ca(path: Option<&Path>) -> ClientResult<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    std::fs::read_to_string(path).map(Some).map_err(|err| {
        ClientError::Configuration(format!(
            "cannot read CA certificate '{}': {err}",
            path.display()
        ))
    })
}

impl ConnectionParams {
    /// Validate a raw bag.
    ///
    /// Fails with [`ClientError::Configuration`] when `pathToCa` is set but the
    /// file cannot be read.
    pub fn from_raw(raw: &RawConfig) -> ClientResult<Self> {
        let path_to_ca = ca_path(raw);
        let ca = read_ca(path_to_ca.as_deref())?;
        Ok(Self::with_ca(raw, path_to_ca, ca))
    }

    /// Fill every field from `raw` except the CA pair, which is taken as given.
    pub(crate) fn with_ca(raw: &RawConfig, path_to_ca: Option<PathBuf>, ca: Option<String>) -> Self {
        let string = |key: &str| raw.get_string(key).unwrap_or_default();
        Self {
            host: string(keys::HOST),
            port: raw.get_port(keys::PORT),
            base_path: string(keys::REST_BASE_PATH),
            manage_port: raw.get_port(keys::MANAGE_PORT),
            admin_port: raw.get_port(keys::ADMIN_PORT),
            test_port: raw.get_port(keys::TEST_PORT),
            manage_base_path: string(keys::MANAGE_BASE_PATH),
            admin_base_path: string(keys::ADMIN_BASE_PATH),
            test_base_path: string(keys::TEST_BASE_PATH),
            user: string(keys::USER),
            password: string(keys::PASSWORD),
            auth: AuthScheme::parse(&string(keys::AUTH_TYPE)),
            ssl: raw.get_bool(keys::SSL).unwrap_or(false),
            path_to_ca,
            ca,
            reject_unauthorized: raw.get_bool(keys::REJECT_UNAUTHORIZED).unwrap_or(true),
            content_db: string(keys::CONTENT_DB),
            modules_db: string(keys::MODULES_DB),
        }
    }

    /// Whether a connection built from `other` can be reused for `self`.
    ///
    /// Base paths and the loaded CA content are not compared. Ports compare
    /// equal when both are unset.
    #[must_use]
    pub fn same_as(&self, other: &ConnectionParams) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.manage_port == other.manage_port
            && self.admin_port == other.admin_port
            && self.test_port == other.test_port
            && self.user == other.user
            && self.password == other.password
            && self.auth == other.auth
            && self.ssl == other.ssl
            && self.path_to_ca == other.path_to_ca
            && self.reject_unauthorized == other.reject_unauthorized
            && self.content_db == other.content_db
            && self.modules_db == other.modules_db
    }

    /// `scheme://host:port`, without the base path.
    #[must_use]
    pub fn origin(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{scheme}://{}:{port}", self.host),
            None => format!("{scheme}://{}", self.host),
        }
    }

    /// Base path normalized to a leading slash and no trailing slash.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    /// Origin plus base path; request paths are appended to this.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}{}", self.origin(), self.normalized_base_path())
    }

    /// Rebuild the raw bag this instance was validated from.
    ///
    /// Used to derive sibling roles; the CA path is carried, not its content.
    #[must_use]
    pub fn to_raw(&self) -> RawConfig {
        let mut raw = RawConfig::new()
            .with(keys::HOST, self.host.as_str())
            .with(keys::REST_BASE_PATH, self.base_path.as_str())
            .with(keys::MANAGE_BASE_PATH, self.manage_base_path.as_str())
            .with(keys::ADMIN_BASE_PATH, self.admin_base_path.as_str())
            .with(keys::TEST_BASE_PATH, self.test_base_path.as_str())
            .with(keys::USER, self.user.as_str())
            .with(keys::PASSWORD, self.password.as_str())
            .with(keys::AUTH_TYPE, self.auth.as_str())
            .with(keys::SSL, self.ssl)
            .with(keys::REJECT_UNAUTHORIZED, self.reject_unauthorized)
            .with(keys::CONTENT_DB, self.content_db.as_str())
            .with(keys::MODULES_DB, self.modules_db.as_str());
        raw.set_opt(keys::PORT, self.port);
        raw.set_opt(keys::MANAGE_PORT, self.manage_port);
        raw.set_opt(keys::ADMIN_PORT, self.admin_port);
        raw.set_opt(keys::TEST_PORT, self.test_port);
        raw.set_opt(
            keys::PATH_TO_CA,
            self.path_to_ca
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        );
        raw
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .field("manage_port", &self.manage_port)
            .field("admin_port", &self.admin_port)
            .field("test_port", &self.test_port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("auth", &self.auth)
            .field("ssl", &self.ssl)
            .field("path_to_ca", &self.path_to_ca)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("content_db", &self.content_db)
            .field("modules_db", &self.modules_db)
            .finish_non_exhaustive()
    }
}
