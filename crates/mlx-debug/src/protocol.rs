//! Remote debug endpoint layout.
//!
//! Every session call is addressed as `/{namespace}/v1/{action}/{id}`; the
//! two dialects differ only in namespace and verb names.

use mlx_client::Dialect;

/// Server-side timeout of one `wait` poll, in seconds.
pub const WAIT_TIMEOUT_SECS: u32 = 5;

/// Body of a connected-status probe for a server that has a debug session.
pub const CONNECTED_MARKER: &str = "true";

/// System app servers that are never offered for debugging.
pub const RESERVED_SERVERS: [&str; 4] = ["Admin", "App-Services", "HealthCheck", "Manage"];

/// Endpoint names for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbs {
    pub namespace: &'static str,
    pub resume: &'static str,
    pub step_over: &'static str,
    pub step_into: &'static str,
    pub step_out: &'static str,
    pub stack: &'static str,
    pub set_breakpoint: &'static str,
    pub remove_breakpoint: &'static str,
    pub eval: &'static str,
    pub properties: &'static str,
    pub wait: &'static str,
    pub disable: &'static str,
    pub cancel: &'static str,
    pub attach: &'static str,
}

pub const XQUERY_VERBS: Verbs = Verbs {
    namespace: "xqydbg",
    resume: "continue",
    step_over: "next",
    step_into: "step",
    step_out: "out",
    stack: "stack",
    set_breakpoint: "break",
    remove_breakpoint: "clear",
    eval: "value",
    properties: "properties",
    wait: "wait",
    disable: "disable",
    cancel: "request-cancel",
    attach: "attach",
};

pub const JAVASCRIPT_VERBS: Verbs = Verbs {
    namespace: "jsdbg",
    resume: "resume",
    step_over: "step-over",
    step_into: "step-into",
    step_out: "step-out",
    stack: "stack-trace",
    set_breakpoint: "set-breakpoint",
    remove_breakpoint: "remove-breakpoint",
    eval: "eval-on-call-frame",
    properties: "properties",
    wait: "wait",
    disable: "disable",
    cancel: "request-cancel",
    attach: "attach",
};

/// XQuery-only: resolves `(uri, line)` to an expression id.
pub const XQUERY_LINE_LOOKUP: &str = "line";

/// Server-scoped actions shared by both namespaces.
pub const CONNECTED: &str = "connected";
pub const CONNECT: &str = "connect";
pub const DISCONNECT: &str = "disconnect";
pub const PAUSED_REQUESTS: &str = "paused-requests";

impl Verbs {
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> &'static Verbs {
        match dialect {
            Dialect::Xquery => &XQUERY_VERBS,
            Dialect::Javascript => &JAVASCRIPT_VERBS,
        }
    }

    /// `/{namespace}/v1/{action}/{target}` with `target` percent-encoded.
    #[must_use]
    pub fn path(&self, action: &str, target: &str) -> String {
        format!(
            "/{}/v1/{action}/{}",
            self.namespace,
            urlencoding::encode(target)
        )
    }

    /// `/{namespace}/v1/{action}` for calls not bound to a request or server.
    #[must_use]
    pub fn root(&self, action: &str) -> String {
        format!("/{}/v1/{action}", self.namespace)
    }
}

/// Append `query` as a URL query string, skipping empty values.
#[must_use]
pub fn with_query(path: String, query: &[(&str, &str)]) -> String {
    let encoded = query
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>();
    if encoded.is_empty() {
        path
    } else {
        format!("{path}?{}", encoded.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_and_encoded() {
        assert_eq!(XQUERY_VERBS.path("continue", "123"), "/xqydbg/v1/continue/123");
        assert_eq!(
            JAVASCRIPT_VERBS.path(CONNECTED, "App Server"),
            "/jsdbg/v1/connected/App%20Server"
        );
        assert_eq!(JAVASCRIPT_VERBS.root(PAUSED_REQUESTS), "/jsdbg/v1/paused-requests");
    }

    #[test]
    fn empty_query_values_are_omitted() {
        let path = with_query(
            "/jsdbg/v1/eval-on-call-frame/9".to_string(),
            &[("expr", "a + b"), ("call-frame", "")],
        );
        assert_eq!(path, "/jsdbg/v1/eval-on-call-frame/9?expr=a%20%2B%20b");
        assert_eq!(with_query("/x".to_string(), &[]), "/x");
    }

    #[test]
    fn dialect_verbs_differ_only_in_names() {
        assert_eq!(Verbs::for_dialect(Dialect::Xquery).resume, "continue");
        assert_eq!(Verbs::for_dialect(Dialect::Javascript).resume, "resume");
        assert_eq!(XQUERY_VERBS.cancel, JAVASCRIPT_VERBS.cancel);
    }
}
