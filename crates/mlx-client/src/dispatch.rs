//! Query dispatch: wrap user scripts for remote evaluation.
//!
//! Scripts are never evaluated directly. Each dialect gets an envelope that
//! receives the user script and the database selection as external
//! variables, so the script text is never spliced into the envelope itself.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::connection::DatabaseConnection;
use crate::error::{ClientError, ClientResult};
use crate::multipart::EvalItem;
use crate::transport::HttpRequest;

pub const ROWS_PATH: &str = "/v1/rows";
pub const GRAPHQL_PATH: &str = "/v1/rows/graphql";
pub const SPARQL_PATH: &str = "/v1/graphs/sparql";
/// Launch endpoint of the JavaScript debugger; answers with a request id.
pub const JAVASCRIPT_DEBUG_EVAL_PATH: &str = "/jsdbg/v1/eval";

const OPTIC_DSL_CONTENT_TYPE: &str = "application/vnd.marklogic.querydsl+javascript";
const SQL_CONTENT_TYPE: &str = "application/sql";
const SPARQL_CONTENT_TYPE: &str = "application/sparql-query";
const SPARQL_RESULTS_TYPE: &str = "application/sparql-results+json";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Script language understood by the remote evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Xquery,
    Javascript,
}

impl Dialect {
    /// Tag used when listing servers per dialect.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Dialect::Xquery => "XQY",
            Dialect::Javascript => "JS",
        }
    }

    /// Parse a user-facing dialect name (`xquery`, `xqy`, `javascript`, `sjs`, `js`).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "xquery" | "xqy" | "xq" => Some(Dialect::Xquery),
            "javascript" | "sjs" | "js" => Some(Dialect::Javascript),
            _ => None,
        }
    }
}

/// XQuery evaluation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalEntry {
    /// Evaluate and return the result sequence.
    Eval,
    /// Start a debug request paused at its first expression; the result is
    /// the request id.
    DebugEval,
}

impl EvalEntry {
    #[must_use]
    pub fn function(self) -> &'static str {
        match self {
            EvalEntry::Eval => "xdmp:eval",
            EvalEntry::DebugEval => "dbg:eval",
        }
    }
}

/// XQuery envelope. `<database>`/`<modules>` options are present only for
/// non-empty database names.
#[must_use]
pub fn xquery_envelope(entry: EvalEntry, content_db: &str, modules_db: &str) -> String {
    let mut options = String::new();
    if !content_db.is_empty() {
        options.push_str("\n    <database>{xdmp:database($contentDb)}</database>");
    }
    if !modules_db.is_empty() {
        options.push_str("\n    <modules>{xdmp:database($modulesDb)}</modules>");
    }
    format!(
        r#"xquery version "1.0-ml";
declare variable $actualQuery as xs:string external;
declare variable $contentDb as xs:string external;
declare variable $modulesDb as xs:string external;
let $options :=
  <options xmlns="xdmp:eval">{options}
  </options>
return {function}($actualQuery, (), $options)
"#,
        function = entry.function()
    )
}

/// Server-side JavaScript envelope. Database options are set in the script
/// body, only for non-empty names.
#[must_use]
pub fn javascript_envelope(content_db: &str, modules_db: &str) -> String {
    let mut script = String::from(
        "'use strict';\nvar actualQuery, contentDb, modulesDb;\nconst options = {};\n",
    );
    if !content_db.is_empty() {
        script.push_str("options.database = xdmp.database(contentDb);\n");
    }
    if !modules_db.is_empty() {
        script.push_str("options.modules = xdmp.database(modulesDb);\n");
    }
    script.push_str("xdmp.eval(actualQuery, null, options);\n");
    script
}

fn external_vars(connection: &DatabaseConnection, script: &str) -> Value {
    let params = connection.params();
    json!({
        "actualQuery": script,
        "contentDb": params.content_db,
        "modulesDb": params.modules_db,
    })
}

/// Evaluate an XQuery script through `entry`.
pub async fn send_xquery(
    connection: &DatabaseConnection,
    script: &str,
    entry: EvalEntry,
) -> ClientResult<Vec<EvalItem>> {
    let params = connection.params();
    let envelope = xquery_envelope(entry, &params.content_db, &params.modules_db);
    debug!("dispatching xquery via {}", entry.function());
    connection
        .xquery_eval(&envelope, &external_vars(connection, script))
        .await
}

/// Evaluate a server-side JavaScript script through `entry`.
///
/// [`EvalEntry::DebugEval`] starts a debug request instead of evaluating:
/// the script goes to the JavaScript debugger's launch endpoint and the only
/// item returned is the request id.
pub async fn send_javascript(
    connection: &DatabaseConnection,
    script: &str,
    entry: EvalEntry,
) -> ClientResult<Vec<EvalItem>> {
    let params = connection.params();
    if entry == EvalEntry::DebugEval {
        let mut fields = vec![("javascript".to_string(), script.to_string())];
        if !params.content_db.is_empty() {
            fields.push(("database".to_string(), params.content_db.clone()));
        }
        if !params.modules_db.is_empty() {
            fields.push(("modules".to_string(), params.modules_db.clone()));
        }
        debug!("dispatching javascript via {JAVASCRIPT_DEBUG_EVAL_PATH}");
        let reply = connection
            .send(HttpRequest::post_form(JAVASCRIPT_DEBUG_EVAL_PATH, fields))
            .await?;
        let request_id = reply.body.trim();
        if request_id.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![EvalItem {
            primitive: None,
            content_type: reply.content_type,
            path: None,
            value: request_id.to_string(),
        }]);
    }
    let envelope = javascript_envelope(&params.content_db, &params.modules_db);
    connection
        .javascript_eval(&envelope, &external_vars(connection, script))
        .await
}

/// Row-oriented query languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowQuery {
    /// Optic plan: serialized JSON when the text starts with `{`, DSL otherwise.
    Optic,
    Sql,
    Sparql,
    Graphql,
}

impl RowQuery {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "optic" => Some(RowQuery::Optic),
            "sql" => Some(RowQuery::Sql),
            "sparql" => Some(RowQuery::Sparql),
            "graphql" => Some(RowQuery::Graphql),
            _ => None,
        }
    }
}

/// Uniform row result. `pre_request_error` is set when the query could not
/// be submitted at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResult {
    pub columns: Vec<Value>,
    pub rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_request_error: Option<String>,
}

impl RowsResult {
    #[must_use]
    pub fn pre_request_error(message: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            pre_request_error: Some(message.into()),
        }
    }
}

/// Submit a row query.
///
/// A serialized Optic plan that is not valid JSON is reported through
/// [`RowsResult::pre_request_error`] without contacting the server.
pub async fn send_rows(
    connection: &DatabaseConnection,
    query: &str,
    kind: RowQuery,
) -> ClientResult<RowsResult> {
    let request = match kind {
        RowQuery::Optic if query.trim_start().starts_with('{') => {
            let plan: Value = match serde_json::from_str(query) {
                Ok(plan) => plan,
                Err(err) => return Ok(RowsResult::pre_request_error(err.to_string())),
            };
            let path = rows_path(connection, ROWS_PATH);
            HttpRequest::post_text(path, JSON_CONTENT_TYPE, plan.to_string())
        }
        RowQuery::Optic => {
            let path = rows_path(connection, ROWS_PATH);
            HttpRequest::post_text(path, OPTIC_DSL_CONTENT_TYPE, query)
        }
        RowQuery::Sql => {
            HttpRequest::post_text(rows_path(connection, ROWS_PATH), SQL_CONTENT_TYPE, query)
        }
        RowQuery::Sparql => {
            let path = rows_path(connection, SPARQL_PATH);
            let request = HttpRequest::post_text(path, SPARQL_CONTENT_TYPE, query)
                .header("Accept", SPARQL_RESULTS_TYPE);
            let reply = connection.send(request).await?;
            return parse_sparql_results(&reply.body);
        }
        RowQuery::Graphql => {
            let body = json!({ "query": query }).to_string();
            let path = rows_path(connection, GRAPHQL_PATH);
            let reply = connection
                .send(HttpRequest::post_text(path, JSON_CONTENT_TYPE, body))
                .await?;
            return parse_graphql_result(&reply.body);
        }
    };
    let reply = connection
        .send(request.header("Accept", JSON_CONTENT_TYPE))
        .await?;
    parse_rows(&reply.body)
}

fn rows_path(connection: &DatabaseConnection, path: &str) -> String {
    let content_db = &connection.params().content_db;
    if content_db.is_empty() {
        path.to_string()
    } else {
        format!("{path}?database={}", urlencoding::encode(content_db))
    }
}

fn parse_json(body: &str) -> ClientResult<Option<Value>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|err| ClientError::Response(err.to_string()))
}

fn array_at(value: &Value, pointer: &str) -> Vec<Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `{"columns": [...], "rows": [...]}` from the rows endpoint.
pub fn parse_rows(body: &str) -> ClientResult<RowsResult> {
    let Some(value) = parse_json(body)? else {
        return Ok(RowsResult::default());
    };
    Ok(RowsResult {
        columns: array_at(&value, "/columns"),
        rows: array_at(&value, "/rows"),
        pre_request_error: None,
    })
}

/// SPARQL JSON results: `head.vars` become columns, `results.bindings` rows.
pub fn parse_sparql_results(body: &str) -> ClientResult<RowsResult> {
    let Some(value) = parse_json(body)? else {
        return Ok(RowsResult::default());
    };
    Ok(RowsResult {
        columns: array_at(&value, "/head/vars"),
        rows: array_at(&value, "/results/bindings"),
        pre_request_error: None,
    })
}

/// GraphQL responses carry one `data` object, kept whole as the only row.
pub fn parse_graphql_result(body: &str) -> ClientResult<RowsResult> {
    let Some(value) = parse_json(body)? else {
        return Ok(RowsResult::default());
    };
    if let Some(message) = value
        .pointer("/errors/0/message")
        .and_then(Value::as_str)
    {
        return Err(ClientError::Response(message.to_string()));
    }
    let rows = value
        .get("data")
        .filter(|data| !data.is_null())
        .cloned()
        .into_iter()
        .collect();
    Ok(RowsResult {
        columns: Vec::new(),
        rows,
        pre_request_error: None,
    })
}
