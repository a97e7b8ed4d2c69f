//! Debug session errors.

use std::path::PathBuf;

use mlx_client::ClientError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    /// The operation needs a request id but no launch/attach has completed.
    #[error("no active debug session")]
    NoSession,

    /// A remote call failed; carries the transport or HTTP failure as-is.
    #[error(transparent)]
    Protocol(#[from] ClientError),

    /// The launch script could not be read.
    #[error("cannot read '{path}': {message}")]
    Source { path: PathBuf, message: String },

    /// Launch or attach succeeded remotely but returned no request id.
    #[error("server returned no request id")]
    MissingRequestId,

    /// No expression id exists at the breakpoint location.
    #[error("no breakpointable expression at {uri}:{line}")]
    UnresolvedBreakpoint { uri: String, line: u32 },
}

pub type DebugResult<T> = std::result::Result<T, DebugError>;
