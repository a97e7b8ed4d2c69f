//! Server enumeration for connect, disconnect and attach workflows.

use mlx_client::dispatch::{self, EvalEntry};
use mlx_client::{DatabaseConnection, Dialect, EvalItem, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::DebugResult;
use crate::protocol::{
    Verbs, CONNECT, CONNECTED, CONNECTED_MARKER, DISCONNECT, PAUSED_REQUESTS, RESERVED_SERVERS,
};

/// One row per app server: name, id, port and whether an XQuery debug
/// session is already attached to it.
const SERVERS_QUERY: &str = r#"xquery version "1.0-ml";
import module namespace admin = "http://marklogic.com/xdmp/admin" at "/MarkLogic/admin.xqy";
let $config := admin:get-configuration()
let $connected := dbg:connected()
for $id in xdmp:servers()
let $port := try { admin:appserver-get-port($config, $id) } catch ($e) { () }
return xdmp:to-json(map:new((
  map:entry("name", xdmp:server-name($id)),
  map:entry("id", xs:string($id)),
  map:entry("port", $port),
  map:entry("connected", $id = $connected)
)))"#;

const CONNECTED_IDS_QUERY: &str = "dbg:connected()";

const SERVER_NAME_QUERY: &str = r#"xquery version "1.0-ml";
declare variable $id external;
xdmp:server-name(xs:unsignedLong($id))"#;

/// Presentation triple for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerChoice {
    /// Server name.
    pub label: String,
    pub description: String,
    /// Server id.
    pub detail: String,
}

#[derive(Debug, Deserialize)]
struct ServerRow {
    name: String,
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    connected: bool,
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => id,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn server_rows(items: &[EvalItem]) -> Vec<ServerRow> {
    let mut rows = Vec::new();
    for item in items {
        match serde_json::from_str::<Value>(&item.value) {
            Ok(Value::Array(values)) => rows.extend(
                values
                    .into_iter()
                    .filter_map(|value| serde_json::from_value(value).ok()),
            ),
            Ok(value) => match serde_json::from_value(value) {
                Ok(row) => rows.push(row),
                Err(err) => debug!("skipping server row: {err}"),
            },
            Err(err) => debug!("skipping server row: {err}"),
        }
    }
    rows
}

/// Servers a new debug session may connect to.
///
/// Excludes servers that already have a session, the reserved system servers
/// and the server listening on `own_port`. A failed query yields an empty
/// list.
pub async fn list_connectable_servers(
    connection: &DatabaseConnection,
    own_port: Option<u16>,
) -> Vec<ServerChoice> {
    let items = match dispatch::send_xquery(connection, SERVERS_QUERY, EvalEntry::Eval).await {
        Ok(items) => items,
        Err(err) => {
            warn!("server enumeration failed: {err}");
            return Vec::new();
        }
    };
    server_rows(&items)
        .into_iter()
        .filter(|row| !row.connected)
        .filter(|row| !RESERVED_SERVERS.contains(&row.name.as_str()))
        .filter(|row| own_port.is_none() || row.port != own_port)
        .map(|row| ServerChoice {
            description: row
                .port
                .map_or_else(|| "no port".to_string(), |port| format!("port {port}")),
            label: row.name,
            detail: row.id,
        })
        .collect()
}

/// Keep the candidates whose connected-status probe answers `marker`.
///
/// All probes run concurrently. A failed probe drops its candidate, the same
/// as a probe that answers anything else.
pub async fn filter_by_connected_status(
    connection: &DatabaseConnection,
    dialect: Dialect,
    candidates: Vec<ServerChoice>,
    marker: &str,
) -> Vec<ServerChoice> {
    let verbs = Verbs::for_dialect(dialect);
    let mut probes = JoinSet::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let connection = connection.clone();
        let path = verbs.path(CONNECTED, &candidate.label);
        probes.spawn(async move {
            let result = connection
                .execute_generic_request(&path, Method::Get, &[])
                .await;
            (index, result)
        });
    }

    let mut keep = vec![false; candidates.len()];
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((index, Ok(body))) => keep[index] = body.trim() == marker,
            Ok((index, Err(err))) => {
                warn!("connected probe for '{}' failed: {err}", candidates[index].label);
            }
            Err(err) => warn!("connected probe task failed: {err}"),
        }
    }
    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect()
}

/// Names of servers with an XQuery debug session, one lookup per session id.
async fn xquery_connected_names(connection: &DatabaseConnection) -> Vec<String> {
    let ids = match connection.xquery_eval(CONNECTED_IDS_QUERY, &json!({})).await {
        Ok(items) => items,
        Err(err) => {
            warn!("listing connected xquery servers failed: {err}");
            return Vec::new();
        }
    };

    let mut lookups = JoinSet::new();
    for (index, item) in ids.into_iter().enumerate() {
        let connection = connection.clone();
        lookups.spawn(async move {
            let id = item.value.trim().to_string();
            let result = connection
                .xquery_eval(SERVER_NAME_QUERY, &json!({ "id": id }))
                .await;
            (index, id, result)
        });
    }

    let mut names = Vec::new();
    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok((index, id, Ok(items))) => {
                match items.first().map(|item| item.value.trim()) {
                    Some(name) if !name.is_empty() => names.push((index, name.to_string())),
                    _ => warn!("server {id} has no name"),
                }
            }
            Ok((_, id, Err(err))) => warn!("name lookup for server {id} failed: {err}"),
            Err(err) => warn!("name lookup task failed: {err}"),
        }
    }
    names.sort_by_key(|(index, _)| *index);
    names.into_iter().map(|(_, name)| name).collect()
}

/// Every server with an active debug session, tagged `XQY:` or `JS:`.
///
/// The XQuery listing runs against `rest`; JavaScript candidates are probed
/// through `manage`. Both run concurrently and tolerate partial failure.
/// `on_update`, when given, receives the merged list.
pub async fn get_connected_servers(
    rest: &DatabaseConnection,
    manage: &DatabaseConnection,
    own_port: Option<u16>,
    on_update: Option<&dyn Fn(&[String])>,
) -> Vec<String> {
    let javascript = async {
        let candidates = list_connectable_servers(rest, own_port).await;
        filter_by_connected_status(manage, Dialect::Javascript, candidates, CONNECTED_MARKER).await
    };
    let (xquery, javascript) = tokio::join!(xquery_connected_names(rest), javascript);

    let servers = xquery
        .into_iter()
        .map(|name| format!("{}:{name}", Dialect::Xquery.tag()))
        .chain(
            javascript
                .into_iter()
                .map(|choice| format!("{}:{}", Dialect::Javascript.tag(), choice.label)),
        )
        .collect::<Vec<_>>();
    debug!("{} connected server(s)", servers.len());
    if let Some(on_update) = on_update {
        on_update(&servers);
    }
    servers
}

/// Ids of requests currently paused on `server`.
pub async fn list_paused_requests(
    connection: &DatabaseConnection,
    server: &str,
    dialect: Dialect,
) -> DebugResult<Vec<String>> {
    let path = Verbs::for_dialect(dialect).path(PAUSED_REQUESTS, server);
    let body = connection
        .execute_generic_request(&path, Method::Get, &[])
        .await?;
    Ok(parse_id_list(&body))
}

fn parse_id_list(body: &str) -> Vec<String> {
    if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(body) {
        return values
            .into_iter()
            .map(|value| match value {
                Value::String(id) => id,
                other => other.to_string(),
            })
            .filter(|id| !id.is_empty())
            .collect();
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Enable debugging on `server` for `dialect`.
pub async fn connect_server(
    connection: &DatabaseConnection,
    server: &str,
    dialect: Dialect,
) -> DebugResult<()> {
    let path = Verbs::for_dialect(dialect).path(CONNECT, server);
    connection.post_form(&path, Vec::new()).await?;
    debug!("connected {} debugger to {server}", dialect.tag());
    Ok(())
}

/// Disable debugging on `server` for `dialect`.
pub async fn disconnect_server(
    connection: &DatabaseConnection,
    server: &str,
    dialect: Dialect,
) -> DebugResult<()> {
    let path = Verbs::for_dialect(dialect).path(DISCONNECT, server);
    connection.post_form(&path, Vec::new()).await?;
    debug!("disconnected {} debugger from {server}", dialect.tag());
    Ok(())
}
