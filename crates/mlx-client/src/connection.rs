//! Authenticated connection bound to one server role.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::dispatch::{self, Dialect, EvalEntry};
use crate::error::{ClientError, ClientResult};
use crate::multipart::{parse_eval_response, EvalItem};
use crate::params::ConnectionParams;
use crate::transport::{HttpReply, HttpRequest, Method, RequestBody, Transport};

const EVAL_PATH: &str = "/v1/eval";
const MANAGE_RESOURCES_PATH: &str = "/manage/v3?resource-type=database,server";

/// One HTTP client bound to one role's parameters.
///
/// Clones share the underlying agent and authorization state; a clone is the
/// same connection, not a new one.
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    params: Arc<ConnectionParams>,
    transport: Arc<Transport>,
}

impl DatabaseConnection {
    /// Build the HTTP client for `params`. Fails only on TLS configuration.
    pub fn new(params: ConnectionParams) -> ClientResult<Self> {
        let transport = Transport::new(&params)?;
        Ok(Self {
            params: Arc::new(params),
            transport: Arc::new(transport),
        })
    }

    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.transport.base_url()
    }

    /// Whether `other` is a clone of this connection.
    #[must_use]
    pub fn shares_transport_with(&self, other: &DatabaseConnection) -> bool {
        Arc::ptr_eq(&self.transport, &other.transport)
    }

    /// Send one request and return the full reply.
    pub async fn send(&self, request: HttpRequest) -> ClientResult<HttpReply> {
        let transport = Arc::clone(&self.transport);
        tokio::task::spawn_blocking(move || transport.send(&request))
            .await
            .map_err(|err| ClientError::Task(err.to_string()))?
    }

    /// Issue one request against this role's base URL and return the raw body.
    pub async fn execute_generic_request(
        &self,
        path: &str,
        method: Method,
        headers: &[(&str, &str)],
    ) -> ClientResult<String> {
        let request = HttpRequest {
            method,
            path: path.to_string(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
            body: RequestBody::Empty,
        };
        self.send(request).await.map(|reply| reply.body)
    }

    /// POST form fields and return the raw body.
    pub async fn post_form(&self, path: &str, fields: Vec<(String, String)>) -> ClientResult<String> {
        self.send(HttpRequest::post_form(path, fields))
            .await
            .map(|reply| reply.body)
    }

    /// Wrap `script` for `dialect` and evaluate it with this connection's
    /// database selection. See [`dispatch`](crate::dispatch).
    ///
    /// The envelope binds only the script and database names; use
    /// [`xquery_eval`](Self::xquery_eval) or
    /// [`javascript_eval`](Self::javascript_eval) to bind other variables.
    pub async fn evaluate(
        &self,
        script: &str,
        dialect: Dialect,
        entry: EvalEntry,
    ) -> ClientResult<Vec<EvalItem>> {
        match dialect {
            Dialect::Xquery => dispatch::send_xquery(self, script, entry).await,
            Dialect::Javascript => dispatch::send_javascript(self, script, entry).await,
        }
    }

    /// Native XQuery evaluation: `script` runs as-is with `vars` bound as
    /// external variables.
    pub async fn xquery_eval(&self, script: &str, vars: &Value) -> ClientResult<Vec<EvalItem>> {
        self.eval_primitive("xquery", script, vars).await
    }

    /// Native server-side JavaScript evaluation.
    pub async fn javascript_eval(
        &self,
        script: &str,
        vars: &Value,
    ) -> ClientResult<Vec<EvalItem>> {
        self.eval_primitive("javascript", script, vars).await
    }

    async fn eval_primitive(
        &self,
        language: &str,
        script: &str,
        vars: &Value,
    ) -> ClientResult<Vec<EvalItem>> {
        debug!("evaluating {language} ({} bytes)", script.len());
        let fields = vec![
            (language.to_string(), script.to_string()),
            ("vars".to_string(), vars.to_string()),
        ];
        let reply = self
            .send(HttpRequest::post_form(EVAL_PATH, fields).header("Accept", "multipart/mixed"))
            .await?;
        Ok(parse_eval_response(reply.content_type.as_deref(), &reply.body))
    }

    /// Databases and servers known to the cluster, names only.
    pub async fn get_all_resources(&self) -> ClientResult<Value> {
        self.manage_resources(false).await
    }

    /// Databases and servers known to the cluster with their property sets.
    pub async fn get_all_properties(&self) -> ClientResult<Value> {
        self.manage_resources(true).await
    }

    async fn manage_resources(&self, include_properties: bool) -> ClientResult<Value> {
        let path =
            format!("{MANAGE_RESOURCES_PATH}&include-properties={include_properties}&format=json");
        let body = self.execute_generic_request(&path, Method::Get, &[]).await?;
        serde_json::from_str(&body).map_err(|err| ClientError::Response(err.to_string()))
    }
}
