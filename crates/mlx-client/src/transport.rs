//! Blocking HTTP exchange on a ureq agent.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::error::{ClientError, ClientResult};
use crate::params::{AuthScheme, ConnectionParams};
use crate::tls;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_PATH: &str = "/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    Text {
        content_type: String,
        text: String,
    },
}

/// One request relative to a connection's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus optional query string, starting with `/`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn post_form(path: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Form(fields),
        }
    }

    #[must_use]
    pub fn post_text(
        path: impl Into<String>,
        content_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Text {
                content_type: content_type.into(),
                text: text.into(),
            },
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Agent plus authorization state for one role.
#[derive(Debug)]
pub(crate) struct Transport {
    agent: ureq::Agent,
    origin: String,
    base_path: String,
    auth: Authenticator,
}

impl Transport {
    pub(crate) fn new(params: &ConnectionParams) -> ClientResult<Self> {
        let mut builder = ureq::AgentBuilder::new().timeout_connect(CONNECT_TIMEOUT);
        if let Some(config) = tls::client_config(params)? {
            builder = builder.tls_config(config);
        }
        Ok(Self {
            agent: builder.build(),
            origin: params.origin(),
            base_path: params.normalized_base_path(),
            auth: Authenticator::new(params.auth, &params.user, &params.password),
        })
    }

    pub(crate) fn base_url(&self) -> String {
        format!("{}{}", self.origin, self.base_path)
    }

    /// Send `request`, renegotiating authorization once on 401.
    pub(crate) fn send(&self, request: &HttpRequest) -> ClientResult<HttpReply> {
        let url = format!("{}{}", self.base_url(), request.path);
        let uri = format!("{}{}", self.base_path, request.path);
        let method = request.method.as_str();
        debug!("{method} {url}");

        if self.auth.needs_token() {
            self.fetch_token()?;
        }
        let header = self.auth.header(method, &uri);
        match self.dispatch(request, &url, header.as_deref()) {
            Err(ureq::Error::Status(401, response)) => {
                let challenge = response.header("WWW-Authenticate").map(str::to_string);
                if !self.auth.on_unauthorized(challenge.as_deref()) {
                    return Err(status_error(401, &url, response));
                }
                if self.auth.needs_token() {
                    self.fetch_token()?;
                }
                let header = self.auth.header(method, &uri);
                finish(self.dispatch(request, &url, header.as_deref()), &url)
            }
            result => finish(result, &url),
        }
    }

    fn dispatch(
        &self,
        request: &HttpRequest,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<ureq::Response, ureq::Error> {
        let mut call = self.agent.request(request.method.as_str(), url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        if let Some(authorization) = authorization {
            call = call.set("Authorization", authorization);
        }
        match &request.body {
            RequestBody::Empty => call.call(),
            RequestBody::Form(fields) => {
                let pairs = fields
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str()))
                    .collect::<Vec<_>>();
                call.send_form(&pairs)
            }
            RequestBody::Text { content_type, text } => {
                call.set("Content-Type", content_type).send_string(text)
            }
        }
    }

    /// Exchange the API key for a bearer token (Cloud scheme).
    fn fetch_token(&self) -> ClientResult<()> {
        debug_assert_eq!(self.auth.scheme(), AuthScheme::Cloud);
        let url = format!("{}{TOKEN_PATH}", self.origin);
        debug!("POST {url} (token exchange)");
        let response = self
            .agent
            .post(&url)
            .send_form(&[("grant_type", "apikey"), ("key", self.auth.api_key())]);
        let reply = finish(response, &url)?;
        let token: TokenResponse = serde_json::from_str(&reply.body).map_err(|err| {
            warn!("token endpoint returned an unexpected body");
            ClientError::Response(format!("invalid token response: {err}"))
        })?;
        self.auth.set_token(token.access_token);
        Ok(())
    }
}

fn finish(result: Result<ureq::Response, ureq::Error>, url: &str) -> ClientResult<HttpReply> {
    match result {
        Ok(response) => {
            let status = response.status();
            let content_type = response.header("Content-Type").map(str::to_string);
            let body = response
                .into_string()
                .map_err(|err| ClientError::Response(err.to_string()))?;
            Ok(HttpReply {
                status,
                content_type,
                body,
            })
        }
        Err(ureq::Error::Status(status, response)) => Err(status_error(status, url, response)),
        Err(ureq::Error::Transport(transport)) => Err(ClientError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

fn status_error(status: u16, url: &str, response: ureq::Response) -> ClientError {
    ClientError::Status {
        status,
        url: url.to_string(),
        body: response.into_string().unwrap_or_default(),
    }
}
