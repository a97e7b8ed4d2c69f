//! Role-scoped HTTP clients and query dispatch for remote evaluation servers.
//!
//! One raw configuration bag is validated into [`ConnectionParams`]; a
//! [`ClientFactory`] derives per-role parameters (REST, manage, admin, test)
//! and builds a [`DatabaseConnection`] for each. Scripts are wrapped for
//! evaluation by the functions in [`dispatch`].

pub mod auth;
pub mod config;
mod connection;
pub mod dispatch;
mod error;
mod factory;
pub mod multipart;
mod params;
mod tls;
mod transport;

pub use config::RawConfig;
pub use connection::DatabaseConnection;
pub use dispatch::{Dialect, EvalEntry, RowQuery, RowsResult};
pub use error::{ClientError, ClientResult};
pub use factory::{ClientFactory, Role};
pub use multipart::EvalItem;
pub use params::{AuthScheme, ConnectionParams};
pub use transport::{HttpReply, HttpRequest, Method, RequestBody};
