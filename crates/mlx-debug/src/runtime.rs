//! Debug session capability set shared by both dialects.

use std::path::Path;

use mlx_client::Dialect;
use tracing::{debug, trace, warn};

use crate::breakpoint::Breakpoint;
use crate::error::{DebugError, DebugResult};
use crate::protocol::WAIT_TIMEOUT_SECS;
use crate::session::{Session, SessionState};

/// One remote debug session.
///
/// Dialect runtimes supply launch, breakpoint and frame evaluation; stepping,
/// polling, inspection and teardown are driven through the dialect's verb
/// table by the provided methods.
#[allow(async_fn_in_trait)]
pub trait DebugRuntime {
    fn dialect(&self) -> Dialect;
    fn session(&self) -> &Session;
    fn session_mut(&mut self) -> &mut Session;

    /// Start `script` as a debug request. On failure the session moves to
    /// [`SessionState::Error`] and keeps no request id.
    async fn launch_script(&mut self, script: &str) -> DebugResult<String>;

    async fn set_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()>;
    async fn remove_breakpoint(&self, breakpoint: &mut Breakpoint) -> DebugResult<()>;

    /// Evaluate `expr` in a paused frame. An empty `frame_id` selects the
    /// top frame and is not sent.
    async fn evaluate_on_call_frame(&self, expr: &str, frame_id: &str) -> DebugResult<String>;

    fn state(&self) -> SessionState {
        self.session().state()
    }

    fn request_id(&self) -> Option<&str> {
        self.session().request_id()
    }

    /// Read the script at `source` and launch it.
    async fn launch(&mut self, source: &Path) -> DebugResult<String> {
        let script = tokio::fs::read_to_string(source)
            .await
            .map_err(|err| DebugError::Source {
                path: source.to_path_buf(),
                message: err.to_string(),
            })?;
        self.launch_script(&script).await
    }

    /// Take over a request that is already paused on the server.
    async fn attach(&mut self, request_id: &str) -> DebugResult<()> {
        let request_id = request_id.trim();
        if request_id.is_empty() {
            return Err(DebugError::MissingRequestId);
        }
        let verbs = self.session().verbs();
        let path = verbs.path(verbs.attach, request_id);
        let result = self
            .session()
            .connection()
            .post_form(&path, Vec::new())
            .await;
        match result {
            Ok(_) => {
                self.session_mut()
                    .begin(request_id.to_string(), SessionState::Attached);
                Ok(())
            }
            Err(err) => {
                self.session_mut().fail();
                Err(err.into())
            }
        }
    }

    async fn resume(&self) -> DebugResult<()> {
        let action = self.session().verbs().resume;
        self.session().control(action, Vec::new()).await.map(drop)
    }

    async fn step_over(&self) -> DebugResult<()> {
        let action = self.session().verbs().step_over;
        self.session().control(action, Vec::new()).await.map(drop)
    }

    async fn step_into(&self) -> DebugResult<()> {
        let action = self.session().verbs().step_into;
        self.session().control(action, Vec::new()).await.map(drop)
    }

    async fn step_out(&self) -> DebugResult<()> {
        let action = self.session().verbs().step_out;
        self.session().control(action, Vec::new()).await.map(drop)
    }

    /// One poll. Empty when nothing happened within the server-side timeout.
    async fn wait(&self) -> DebugResult<String> {
        let action = self.session().verbs().wait;
        let timeout = WAIT_TIMEOUT_SECS.to_string();
        let body = self
            .session()
            .inspect(action, &[("timeout", timeout.as_str())])
            .await?;
        Ok(body.trim().to_string())
    }

    /// Poll until the request reports a status. Empty polls are retried;
    /// a failed poll is returned immediately.
    async fn wait_till_paused(&self) -> DebugResult<String> {
        let mut polls = 0u32;
        loop {
            polls += 1;
            let status = self.wait().await?;
            if !status.is_empty() {
                debug!("request paused after {polls} poll(s)");
                return Ok(status);
            }
            trace!("no debug event yet (poll {polls})");
        }
    }

    async fn stack_trace(&self) -> DebugResult<String> {
        let action = self.session().verbs().stack;
        self.session().inspect(action, &[]).await
    }

    async fn properties(&self, object_id: &str) -> DebugResult<String> {
        let action = self.session().verbs().properties;
        self.session()
            .inspect(action, &[("object-id", object_id)])
            .await
    }

    /// Cancel the remote request, best effort. The session is shut down even
    /// when the cancel call fails.
    async fn terminate(&mut self) -> DebugResult<()> {
        if self.request_id().is_some() {
            let action = self.session().verbs().cancel;
            if let Err(err) = self.session().control(action, Vec::new()).await {
                warn!("request cancel failed: {err}");
            }
        }
        self.session_mut().shutdown();
        Ok(())
    }

    /// Detach from the request without cancelling it. The request id is kept.
    async fn disable(&self) -> DebugResult<()> {
        let action = self.session().verbs().disable;
        self.session().control(action, Vec::new()).await.map(drop)
    }
}
