//! Request id and local state shared by both dialect runtimes.

use std::fmt;

use mlx_client::{DatabaseConnection, HttpRequest};
use tracing::debug;

use crate::error::{DebugError, DebugResult};
use crate::protocol::{with_query, Verbs};

/// Local view of the session. The server's pause state is not mirrored here;
/// it is only observed through `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Shutdown,
    Launched,
    Attached,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::Launched => write!(f, "launched"),
            Self::Attached => write!(f, "attached"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    connection: DatabaseConnection,
    verbs: &'static Verbs,
    request_id: Option<String>,
    state: SessionState,
}

impl Session {
    #[must_use]
    pub fn new(connection: DatabaseConnection, verbs: &'static Verbs) -> Self {
        Self {
            connection,
            verbs,
            request_id: None,
            state: SessionState::Shutdown,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    #[must_use]
    pub fn verbs(&self) -> &'static Verbs {
        self.verbs
    }

    pub(crate) fn begin(&mut self, request_id: String, state: SessionState) {
        debug!("session {request_id} {state}");
        self.request_id = Some(request_id);
        self.state = state;
    }

    /// Enter [`SessionState::Error`]. The request id is dropped, so every
    /// later control or inspect call fails with `NoSession`.
    pub(crate) fn fail(&mut self) {
        self.request_id = None;
        self.state = SessionState::Error;
    }

    pub(crate) fn shutdown(&mut self) {
        self.request_id = None;
        self.state = SessionState::Shutdown;
    }

    pub(crate) fn require_id(&self) -> DebugResult<&str> {
        self.request_id.as_deref().ok_or(DebugError::NoSession)
    }

    /// POST a control action for the current request.
    pub(crate) async fn control(
        &self,
        action: &str,
        fields: Vec<(String, String)>,
    ) -> DebugResult<String> {
        let path = self.verbs.path(action, self.require_id()?);
        Ok(self.connection.post_form(&path, fields).await?)
    }

    /// GET a read-only action for the current request.
    pub(crate) async fn inspect(&self, action: &str, query: &[(&str, &str)]) -> DebugResult<String> {
        let path = with_query(self.verbs.path(action, self.require_id()?), query);
        let reply = self.connection.send(HttpRequest::get(path)).await?;
        Ok(reply.body)
    }
}
