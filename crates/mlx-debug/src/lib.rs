//! Remote debug sessions for XQuery and server-side JavaScript requests.
//!
//! A [`DebugRuntime`] drives one remote request over HTTP: launch or attach,
//! breakpoints, stepping, the poll-until-paused loop, inspection and
//! teardown. [`XqueryRuntime`] and [`JavascriptRuntime`] implement it against
//! the two debug endpoint namespaces. [`discovery`] lists the servers a
//! session can connect to.

mod breakpoint;
pub mod discovery;
mod error;
mod javascript;
pub mod protocol;
mod runtime;
mod session;
mod xquery;

pub use breakpoint::{Breakpoint, ExprId};
pub use discovery::ServerChoice;
pub use error::{DebugError, DebugResult};
pub use javascript::JavascriptRuntime;
pub use protocol::Verbs;
pub use runtime::DebugRuntime;
pub use session::{Session, SessionState};
pub use xquery::XqueryRuntime;
