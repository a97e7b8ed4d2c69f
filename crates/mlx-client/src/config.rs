//! Loosely-typed connection settings.
//!
//! Editors and config files hand over connection settings as a flat bag of
//! camelCase keys whose values may be strings, numbers or booleans. The bag is
//! only read by [`ConnectionParams::from_raw`](crate::ConnectionParams::from_raw);
//! nothing past that boundary sees it.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ClientError, ClientResult};

pub const CONFIG_FILES: &[&str] = &["mlx-debug.toml", ".mlx-debug.toml"];
const CONNECTION_TABLE: &str = "connection";

pub mod keys {
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const MANAGE_PORT: &str = "managePort";
    pub const ADMIN_PORT: &str = "adminPort";
    pub const TEST_PORT: &str = "testPort";
    pub const REST_BASE_PATH: &str = "restBasePath";
    pub const MANAGE_BASE_PATH: &str = "manageBasePath";
    pub const ADMIN_BASE_PATH: &str = "adminBasePath";
    pub const TEST_BASE_PATH: &str = "testBasePath";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "pwd";
    pub const AUTH_TYPE: &str = "authType";
    pub const SSL: &str = "ssl";
    pub const PATH_TO_CA: &str = "pathToCa";
    pub const REJECT_UNAUTHORIZED: &str = "rejectUnauthorized";
    pub const CONTENT_DB: &str = "contentDb";
    pub const MODULES_DB: &str = "modulesDb";
}

/// Raw key/value connection settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawConfig(Map<String, Value>);

impl RawConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Insert only when `value` is present.
    pub fn set_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a value. Numbers and booleans are rendered as text.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// Port view of a value; `None` when missing or not a valid port number.
    #[must_use]
    pub fn get_port(&self, key: &str) -> Option<u16> {
        match self.0.get(key)? {
            Value::Number(number) => number.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(text) => text.trim().parse::<u16>().ok(),
            _ => None,
        }
    }

    /// Boolean view of a value; accepts `true`/`false` strings.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Apply `overrides` on top of this bag; override values win.
    #[must_use]
    pub fn merged(mut self, overrides: &RawConfig) -> Self {
        for (key, value) in &overrides.0 {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    /// Parse the `[connection]` table of a TOML document.
    pub fn from_toml_str(contents: &str) -> ClientResult<Self> {
        let table: toml::Table = toml::from_str(contents)
            .map_err(|err| ClientError::Configuration(format!("invalid config: {err}")))?;
        let Some(connection) = table.get(CONNECTION_TABLE) else {
            return Ok(Self::default());
        };
        match serde_json::to_value(connection) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(ClientError::Configuration(format!(
                "[{CONNECTION_TABLE}] must be a table"
            ))),
            Err(err) => Err(ClientError::Configuration(err.to_string())),
        }
    }

    /// Load settings from the first config file found in `root`.
    ///
    /// A missing file yields an empty bag; an unreadable or malformed one is
    /// an error.
    pub fn load(root: &Path) -> ClientResult<Self> {
        let Some(path) = find_config_file(root) else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(&path).map_err(|err| {
            warn!("Failed to read config at {}", path.display());
            ClientError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }
}

impl From<Map<String, Value>> for RawConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}
