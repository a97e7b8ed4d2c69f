//! Role-scoped parameter derivation.

use std::fmt;

use tracing::debug;

use crate::config::{keys, RawConfig};
use crate::connection::DatabaseConnection;
use crate::error::ClientResult;
use crate::params::{self, ConnectionParams};

/// Server role a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// REST/query app server: evaluation, rows, debug sessions.
    Rest,
    /// Management API.
    Manage,
    /// Administrative interface.
    Admin,
    /// Test harness app server.
    Test,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Rest, Role::Manage, Role::Admin, Role::Test];

    /// Roles that act server-wide and never select a database.
    #[must_use]
    pub fn is_server_wide(self) -> bool {
        !matches!(self, Role::Rest)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Rest => "rest",
            Role::Manage => "manage",
            Role::Admin => "admin",
            Role::Test => "test",
        };
        f.write_str(name)
    }
}

/// Derives per-role [`ConnectionParams`] from one base configuration.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    base: ConnectionParams,
}

impl ClientFactory {
    #[must_use]
    pub fn new(base: ConnectionParams) -> Self {
        Self { base }
    }

    pub fn from_raw(raw: &RawConfig) -> ClientResult<Self> {
        ConnectionParams::from_raw(raw).map(Self::new)
    }

    #[must_use]
    pub fn base(&self) -> &ConnectionParams {
        &self.base
    }

    pub fn new_rest_client_params(&self, overrides: &RawConfig) -> ClientResult<ConnectionParams> {
        self.role_params(Role::Rest, overrides)
    }

    pub fn new_manage_client_params(
        &self,
        overrides: &RawConfig,
    ) -> ClientResult<ConnectionParams> {
        self.role_params(Role::Manage, overrides)
    }

    pub fn new_admin_client_params(
        &self,
        overrides: &RawConfig,
    ) -> ClientResult<ConnectionParams> {
        self.role_params(Role::Admin, overrides)
    }

    pub fn new_test_client_params(&self, overrides: &RawConfig) -> ClientResult<ConnectionParams> {
        self.role_params(Role::Test, overrides)
    }

    /// Parameters for `role`: shared credentials and TLS settings, the role's
    /// own port and base path, then `overrides`.
    ///
    /// Server-wide roles have their database selection cleared even when an
    /// override names one.
    pub fn role_params(&self, role: Role, overrides: &RawConfig) -> ClientResult<ConnectionParams> {
        let base = &self.base;
        let (port, base_path) = match role {
            Role::Rest => (base.port, base.base_path.as_str()),
            Role::Manage => (base.manage_port, base.manage_base_path.as_str()),
            Role::Admin => (base.admin_port, base.admin_base_path.as_str()),
            Role::Test => (base.test_port, base.test_base_path.as_str()),
        };
        let mut raw = base.to_raw();
        match port {
            Some(port) => raw.set(keys::PORT, port),
            None => raw.set(keys::PORT, serde_json::Value::Null),
        }
        raw.set(keys::REST_BASE_PATH, base_path);
        let mut raw = raw.merged(overrides);
        if role.is_server_wide() {
            raw.set(keys::CONTENT_DB, "");
            raw.set(keys::MODULES_DB, "");
        }
        debug!("deriving {role} client parameters");
        let path_to_ca = params::ca_path(&raw);
        let ca = if path_to_ca == base.path_to_ca {
            base.ca.clone()
        } else {
            params::read_ca(path_to_ca.as_deref())?
        };
        Ok(ConnectionParams::with_ca(&raw, path_to_ca, ca))
    }

    /// Build a connection bound to `role`.
    pub fn new_client(&self, role: Role, overrides: &RawConfig) -> ClientResult<DatabaseConnection> {
        let params = self.role_params(role, overrides)?;
        DatabaseConnection::new(params)
    }

    /// Keep `existing` when its parameters match `params`, otherwise build a
    /// fresh connection.
    pub fn reuse_or_build(
        existing: Option<DatabaseConnection>,
        params: ConnectionParams,
    ) -> ClientResult<DatabaseConnection> {
        match existing {
            Some(connection) if connection.params().same_as(&params) => Ok(connection),
            _ => DatabaseConnection::new(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ClientFactory {
        let raw = RawConfig::new()
            .with(keys::HOST, "ml.local")
            .with(keys::PORT, 8000)
            .with(keys::MANAGE_PORT, 8002)
            .with(keys::ADMIN_PORT, 8001)
            .with(keys::TEST_PORT, 8054)
            .with(keys::MANAGE_BASE_PATH, "/manage-proxy")
            .with(keys::USER, "admin")
            .with(keys::PASSWORD, "secret")
            .with(keys::AUTH_TYPE, "basic")
            .with(keys::CONTENT_DB, "Documents")
            .with(keys::MODULES_DB, "Modules");
        ClientFactory::from_raw(&raw).unwrap()
    }

    #[test]
    fn rest_role_keeps_databases() {
        let params = factory().new_rest_client_params(&RawConfig::new()).unwrap();
        assert_eq!(params.port, Some(8000));
        assert_eq!(params.content_db, "Documents");
        assert_eq!(params.modules_db, "Modules");
    }

    #[test]
    fn server_wide_roles_clear_databases() {
        let factory = factory();
        let overrides = RawConfig::new().with(keys::CONTENT_DB, "Other");
        for params in [
            factory.new_manage_client_params(&RawConfig::new()).unwrap(),
            factory.new_admin_client_params(&RawConfig::new()).unwrap(),
            factory.new_test_client_params(&RawConfig::new()).unwrap(),
            factory.new_test_client_params(&overrides).unwrap(),
        ] {
            assert_eq!(params.content_db, "");
            assert_eq!(params.modules_db, "");
        }
    }

    #[test]
    fn roles_use_their_own_port_and_base_path() {
        let factory = factory();
        let manage = factory.new_manage_client_params(&RawConfig::new()).unwrap();
        assert_eq!(manage.port, Some(8002));
        assert_eq!(manage.base_path, "/manage-proxy");
        let admin = factory.new_admin_client_params(&RawConfig::new()).unwrap();
        assert_eq!(admin.port, Some(8001));
        let test = factory.new_test_client_params(&RawConfig::new()).unwrap();
        assert_eq!(test.port, Some(8054));
    }

    #[test]
    fn shared_fields_are_copied() {
        let manage = factory()
            .new_manage_client_params(&RawConfig::new())
            .unwrap();
        assert_eq!(manage.host, "ml.local");
        assert_eq!(manage.user, "admin");
        assert_eq!(manage.password, "secret");
        assert_eq!(manage.auth, crate::AuthScheme::Basic);
    }

    #[test]
    fn overrides_win() {
        let overrides = RawConfig::new()
            .with(keys::PORT, 9000)
            .with(keys::USER, "debugger");
        let params = factory().new_rest_client_params(&overrides).unwrap();
        assert_eq!(params.port, Some(9000));
        assert_eq!(params.user, "debugger");
        assert_eq!(params.host, "ml.local");
    }

    #[test]
    fn missing_role_port_stays_unset() {
        let raw = RawConfig::new().with(keys::HOST, "h").with(keys::PORT, 8000);
        let factory = ClientFactory::from_raw(&raw).unwrap();
        let test = factory.new_test_client_params(&RawConfig::new()).unwrap();
        assert_eq!(test.port, None);
    }

    #[test]
    fn reuse_keeps_matching_connection() {
        let factory = factory();
        let params = factory.new_rest_client_params(&RawConfig::new()).unwrap();
        let existing = DatabaseConnection::new(params.clone()).unwrap();
        let reused = ClientFactory::reuse_or_build(Some(existing.clone()), params).unwrap();
        assert!(reused.shares_transport_with(&existing));

        let changed = factory
            .new_rest_client_params(&RawConfig::new().with(keys::USER, "someone"))
            .unwrap();
        let rebuilt = ClientFactory::reuse_or_build(Some(existing.clone()), changed).unwrap();
        assert!(!rebuilt.shares_transport_with(&existing));
        assert_eq!(rebuilt.params().user, "someone");
    }

    #[test]
    fn roles_reuse_the_loaded_ca() {
        let path = std::env::temp_dir().join(format!("mlx-client-role-ca-{}.pem", std::process::id()));
        std::fs::write(&path, "-----BEGIN CERTIFICATE-----\n").unwrap();
        let raw = RawConfig::new()
            .with(keys::HOST, "ml.local")
            .with(keys::PORT, 8000)
            .with(keys::MANAGE_PORT, 8002)
            .with(keys::PATH_TO_CA, path.to_string_lossy().as_ref());
        let factory = ClientFactory::from_raw(&raw).unwrap();
        std::fs::remove_file(&path).unwrap();

        let manage = factory.new_manage_client_params(&RawConfig::new()).unwrap();
        assert_eq!(manage.ca.as_deref(), Some("-----BEGIN CERTIFICATE-----\n"));
        assert_eq!(manage.path_to_ca.as_deref(), Some(path.as_path()));

        let moved = RawConfig::new().with(keys::PATH_TO_CA, "/definitely/not/here/other.pem");
        assert!(matches!(
            factory.new_rest_client_params(&moved),
            Err(crate::ClientError::Configuration(_))
        ));
    }
}
