//! XQuery debug runtime.
//!
//! Requests are launched through the `dbg:eval` entry point of the XQuery
//! envelope. Breakpoints are addressed by expression id, resolved from the
//! breakpoint's URI and line on first use.

use mlx_client::dispatch::{self, EvalEntry};
use mlx_client::{DatabaseConnection, Dialect};
use tracing::debug;

use crate::breakpoint::Breakpoint;
use crate::error::{DebugError, DebugResult};
use crate::protocol::{XQUERY_LINE_LOOKUP, XQUERY_VERBS};
use crate::runtime::DebugRuntime;
use crate::session::{Session, SessionState};

#[derive(Debug)]
pub struct XqueryRuntime {
    session: Session,
}

impl XqueryRuntime {
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self {
            session: Session::new(connection, &XQUERY_VERBS),
        }
    }

    /// Expression id for `breakpoint`, looked up once and cached on it.
    async fn resolve_expr(&self, breakpoint: &mut Breakpoint) -> DebugResult<String> {
        if let Some(id) = breakpoint.expr_id() {
            return Ok(id.to_string());
        }
        let line = breakpoint.line.to_string();
        let body = self
            .session
            .inspect(
                XQUERY_LINE_LOOKUP,
                &[("uri", breakpoint.uri.as_str()), ("line", line.as_str())],
            )
            .await?;
        let Some(id) = body.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Err(DebugError::UnresolvedBreakpoint {
                uri: breakpoint.uri.clone(),
                line: breakpoint.line,
            });
        };
        debug!("{}:{} resolved to expression {id}", breakpoint.uri, breakpoint.line);
        Ok(breakpoint.resolve(id.to_string()))
    }
}

impl DebugRuntime for XqueryRuntime {
    fn dialect(&self) -> Dialect {
        Dialect::Xquery
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    async fn launch_script(&mut self, script: &str) -> DebugResult<String> {
        let result =
            dispatch::send_xquery(self.session.connection(), script, EvalEntry::DebugEval).await;
        let items = match result {
            Ok(items) => items,
            Err(err) => {
                self.session.fail();
                return Err(err.into());
            }
        };
        let request_id = items
            .first()
            .map(|item| item.value.trim())
            .filter(|id| !id.is_empty());
        let Some(request_id) = request_id else {
            self.session.fail();
            return Err(DebugError::MissingRequestId);
        };
        let request_id = request_id.to_string();
        self.session
            .begin(request_id.clone(), SessionState::Launched);
        Ok(request_id)
    }

    async fn set_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()> {
        if breakpoint.condition.is_some() {
            debug!("xquery breakpoints ignore conditions");
        }
        let expr = self.resolve_expr(breakpoint).await?;
        self.session
            .control(
                XQUERY_VERBS.set_breakpoint,
                vec![("expr-id".to_string(), expr)],
            )
            .await
            .map(drop)
    }

    async fn remove_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()> {
        let expr = self.resolve_expr(breakpoint).await?;
        self.session
            .control(
                XQUERY_VERBS.remove_breakpoint,
                vec![("expr-id".to_string(), expr)],
            )
            .await
            .map(drop)
    }

    async fn evaluate_on_call_frame(&self, expr: &str, frame_id: &str) -> DebugResult<String> {
        self.session
            .inspect(XQUERY_VERBS.eval, &[("expr", expr), ("call-frame", frame_id)])
            .await
    }
}
