#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use mlx_client::config::keys;
use mlx_client::{ClientFactory, DatabaseConnection, RawConfig, Role};
use tiny_http::{Header, Response, Server};

pub const BOUNDARY: &str = "ML_BOUNDARY_7f3a";

#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub body: String,
}

impl Seen {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    pub fn query(&self) -> HashMap<String, String> {
        self.url
            .split_once('?')
            .map(|(_, query)| decode_pairs(query))
            .unwrap_or_default()
    }

    pub fn form(&self) -> HashMap<String, String> {
        decode_pairs(&self.body)
    }

    /// Parsed `vars` field of an evaluation request.
    pub fn vars(&self) -> serde_json::Value {
        self.form()
            .get("vars")
            .map(|vars| serde_json::from_str(vars).unwrap())
            .unwrap_or_default()
    }
}

fn decode_pairs(text: &str) -> HashMap<String, String> {
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect()
}

fn decode(text: &str) -> String {
    urlencoding::decode(&text.replace('+', " "))
        .unwrap()
        .into_owned()
}

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

pub fn ok(body: impl Into<String>) -> Reply {
    Reply {
        status: 200,
        headers: Vec::new(),
        body: body.into(),
    }
}

pub fn status(status: u16) -> Reply {
    Reply {
        status,
        headers: Vec::new(),
        body: format!("mock status {status}"),
    }
}

/// `multipart/mixed` evaluation response with one part per value.
pub fn multipart(values: &[&str]) -> Reply {
    let mut body = String::new();
    for value in values {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Type: text/plain\r\nX-Primitive: string\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Reply {
        status: 200,
        headers: vec![(
            "Content-Type",
            format!("multipart/mixed; boundary={BOUNDARY}"),
        )],
        body,
    }
}

/// Mock evaluation server on an ephemeral port. Every request is recorded
/// before `handler` answers it.
pub struct MockEngine {
    pub port: u16,
    log: Arc<Mutex<Vec<Seen>>>,
}

impl MockEngine {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Seen) -> Reply + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("bind mock server");
        let port = server.server_addr().to_ip().expect("tcp listener").port();
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen_log = Arc::clone(&log);
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let seen = Seen {
                    method: request.method().as_str().to_string(),
                    url: request.url().to_string(),
                    body,
                };
                seen_log.lock().unwrap().push(seen.clone());
                let reply = handler(&seen);
                let mut response = Response::from_string(reply.body).with_status_code(reply.status);
                for (name, value) in reply.headers {
                    response.add_header(Header::from_bytes(name, value.as_bytes()).unwrap());
                }
                let _ = request.respond(response);
            }
        });
        Self { port, log }
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.log.lock().unwrap().clone()
    }

    /// Requests whose path (without query) equals `path`.
    pub fn hits(&self, path: &str) -> Vec<Seen> {
        self.requests()
            .into_iter()
            .filter(|seen| seen.path() == path)
            .collect()
    }

    pub fn settings(&self) -> RawConfig {
        RawConfig::new()
            .with(keys::HOST, "127.0.0.1")
            .with(keys::PORT, self.port)
            .with(keys::MANAGE_PORT, self.port)
            .with(keys::USER, "admin")
            .with(keys::PASSWORD, "admin")
            .with(keys::AUTH_TYPE, "BASIC")
    }

    pub fn connection(&self, role: Role) -> DatabaseConnection {
        self.connection_with(role, &RawConfig::new())
    }

    pub fn connection_with(&self, role: Role, overrides: &RawConfig) -> DatabaseConnection {
        ClientFactory::from_raw(&self.settings())
            .unwrap()
            .new_client(role, overrides)
            .unwrap()
    }
}
