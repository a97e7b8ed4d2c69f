//! Server-side JavaScript debug runtime.
//!
//! Breakpoints are addressed by URL and position; line and column numbers go
//! over the wire 0-based.

use mlx_client::dispatch::{self, EvalEntry};
use mlx_client::{DatabaseConnection, Dialect};

use crate::breakpoint::Breakpoint;
use crate::error::{DebugError, DebugResult};
use crate::protocol::JAVASCRIPT_VERBS;
use crate::runtime::DebugRuntime;
use crate::session::{Session, SessionState};

#[derive(Debug)]
pub struct JavascriptRuntime {
    session: Session,
}

impl JavascriptRuntime {
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self {
            session: Session::new(connection, &JAVASCRIPT_VERBS),
        }
    }
}

fn location_fields(breakpoint: &Breakpoint) -> Vec<(String, String)> {
    let mut fields = vec![
        ("url".to_string(), breakpoint.uri.clone()),
        (
            "lineNumber".to_string(),
            breakpoint.line.saturating_sub(1).to_string(),
        ),
    ];
    if let Some(column) = breakpoint.column {
        fields.push((
            "columnNumber".to_string(),
            column.saturating_sub(1).to_string(),
        ));
    }
    fields
}

impl DebugRuntime for JavascriptRuntime {
    fn dialect(&self) -> Dialect {
        Dialect::Javascript
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    async fn launch_script(&mut self, script: &str) -> DebugResult<String> {
        let result =
            dispatch::send_javascript(self.session.connection(), script, EvalEntry::DebugEval)
                .await;
        let items = match result {
            Ok(items) => items,
            Err(err) => {
                self.session.fail();
                return Err(err.into());
            }
        };
        let Some(request_id) = items.first().map(|item| item.value.clone()) else {
            self.session.fail();
            return Err(DebugError::MissingRequestId);
        };
        self.session
            .begin(request_id.clone(), SessionState::Launched);
        Ok(request_id)
    }

    async fn set_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()> {
        let mut fields = location_fields(breakpoint);
        if let Some(condition) = breakpoint.condition.as_ref().filter(|c| !c.is_empty()) {
            fields.push(("condition".to_string(), condition.clone()));
        }
        self.session
            .control(JAVASCRIPT_VERBS.set_breakpoint, fields)
            .await
            .map(drop)
    }

    async fn remove_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()> {
        self.session
            .control(
                JAVASCRIPT_VERBS.remove_breakpoint,
                location_fields(breakpoint),
            )
            .await
            .map(drop)
    }

    async fn evaluate_on_call_frame(&self, expr: &str, frame_id: &str) -> DebugResult<String> {
        self.session
            .inspect(JAVASCRIPT_VERBS.eval, &[("expr", expr), ("call-frame", frame_id)])
            .await
    }
}
