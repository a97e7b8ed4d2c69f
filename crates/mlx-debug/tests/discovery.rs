mod common;

use std::sync::Mutex;

use common::{multipart, ok, status, MockEngine, Seen};
use mlx_client::{Dialect, Role};
use mlx_debug::discovery::{
    connect_server, disconnect_server, filter_by_connected_status, get_connected_servers,
    list_connectable_servers, list_paused_requests,
};
use mlx_debug::ServerChoice;

const OWN_PORT: u16 = 8040;

const SERVERS: [&str; 5] = [
    r#"{"name":"Admin","id":"101","port":8001,"connected":false}"#,
    r#"{"name":"Self","id":"102","port":8040,"connected":false}"#,
    r#"{"name":"Orders","id":"103","port":8010,"connected":false}"#,
    r#"{"name":"Busy","id":"104","port":8011,"connected":true}"#,
    r#"{"name":"Billing","id":"105","port":8012,"connected":false}"#,
];

/// Answers the server enumeration, the connected-id listing, per-id name
/// lookups and JavaScript connected probes.
fn route(seen: &Seen) -> common::Reply {
    if seen.path() == "/v1/eval" {
        let form = seen.form();
        let script = form.get("xquery").cloned().unwrap_or_default();
        if seen.vars()["actualQuery"]
            .as_str()
            .is_some_and(|query| query.contains("xdmp:servers()"))
        {
            return multipart(&SERVERS);
        }
        if script.contains("xdmp:server-name(xs:unsignedLong($id))") {
            return match seen.vars()["id"].as_str() {
                Some("201") => ok("Search"),
                Some("203") => ok("Reports"),
                _ => status(500),
            };
        }
        if script == "dbg:connected()" {
            return multipart(&["201", "202", "203"]);
        }
        return status(400);
    }
    match seen.path() {
        "/jsdbg/v1/connected/Orders" => ok("true"),
        "/jsdbg/v1/connected/Billing" => ok("false"),
        _ => status(404),
    }
}

fn choice(label: &str) -> ServerChoice {
    ServerChoice {
        label: label.to_string(),
        description: String::new(),
        detail: String::new(),
    }
}

#[tokio::test]
async fn connectable_servers_exclude_reserved_own_and_connected() {
    let engine = MockEngine::start(route);
    let rest = engine.connection(Role::Rest);

    let servers = list_connectable_servers(&rest, Some(OWN_PORT)).await;
    let labels = servers.iter().map(|s| s.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["Orders", "Billing"]);
    assert_eq!(
        servers[0],
        ServerChoice {
            label: "Orders".to_string(),
            description: "port 8010".to_string(),
            detail: "103".to_string(),
        }
    );
}

#[tokio::test]
async fn only_the_eligible_candidate_survives() {
    let engine = MockEngine::start(|seen| match seen.path() {
        "/v1/eval" => multipart(&[
            r#"{"name":"App-Services","id":"1","port":8000,"connected":false}"#,
            r#"{"name":"Mine","id":"2","port":8040,"connected":false}"#,
            r#"{"name":"Eligible","id":"3","port":8050,"connected":false}"#,
        ]),
        _ => status(404),
    });

    let servers = list_connectable_servers(&engine.connection(Role::Rest), Some(OWN_PORT)).await;
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].label, "Eligible");
}

#[tokio::test]
async fn failed_enumeration_yields_no_servers() {
    let engine = MockEngine::start(|_| status(500));
    let servers = list_connectable_servers(&engine.connection(Role::Rest), Some(OWN_PORT)).await;
    assert!(servers.is_empty());
}

#[tokio::test]
async fn connected_filter_keeps_marker_matches_in_order() {
    let engine = MockEngine::start(|seen| match seen.path() {
        "/jsdbg/v1/connected/Alpha" | "/jsdbg/v1/connected/Gamma" => ok("true\n"),
        "/jsdbg/v1/connected/Beta" => ok("false"),
        _ => status(500),
    });
    let manage = engine.connection(Role::Manage);
    let candidates = ["Alpha", "Beta", "Broken", "Gamma"].map(choice).to_vec();

    let kept = filter_by_connected_status(&manage, Dialect::Javascript, candidates, "true").await;
    let labels = kept.iter().map(|s| s.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["Alpha", "Gamma"]);

    let probes = engine.requests();
    assert_eq!(probes.len(), 4);
    assert!(probes.iter().all(|seen| seen.method == "GET"));
}

#[tokio::test]
async fn connected_servers_merge_both_dialects() {
    let engine = MockEngine::start(route);
    let rest = engine.connection(Role::Rest);
    let manage = engine.connection(Role::Manage);
    let updates = Mutex::new(Vec::new());
    let on_update = |servers: &[String]| updates.lock().unwrap().push(servers.to_vec());

    let servers = get_connected_servers(&rest, &manage, Some(OWN_PORT), Some(&on_update)).await;
    assert_eq!(servers, vec!["XQY:Search", "XQY:Reports", "JS:Orders"]);
    assert_eq!(updates.into_inner().unwrap(), vec![servers.clone()]);

    let lookups = engine
        .hits("/v1/eval")
        .into_iter()
        .filter(|seen| seen.vars().get("id").is_some())
        .count();
    assert_eq!(lookups, 3);
}

#[tokio::test]
async fn connected_servers_without_callback() {
    let engine = MockEngine::start(route);
    let servers = get_connected_servers(
        &engine.connection(Role::Rest),
        &engine.connection(Role::Manage),
        Some(OWN_PORT),
        None,
    )
    .await;
    assert_eq!(servers.len(), 3);
}

#[tokio::test]
async fn paused_requests_and_connection_toggles() {
    let engine = MockEngine::start(|seen| match seen.path() {
        "/xqydbg/v1/paused-requests/App%20Server" => ok(r#"["11","12"]"#),
        "/jsdbg/v1/paused-requests/App%20Server" => ok("21\n22\n"),
        _ => ok(""),
    });
    let manage = engine.connection(Role::Manage);

    assert_eq!(
        list_paused_requests(&manage, "App Server", Dialect::Xquery)
            .await
            .unwrap(),
        vec!["11", "12"]
    );
    assert_eq!(
        list_paused_requests(&manage, "App Server", Dialect::Javascript)
            .await
            .unwrap(),
        vec!["21", "22"]
    );

    connect_server(&manage, "App Server", Dialect::Javascript)
        .await
        .unwrap();
    disconnect_server(&manage, "App Server", Dialect::Xquery)
        .await
        .unwrap();
    assert_eq!(engine.hits("/jsdbg/v1/connect/App%20Server")[0].method, "POST");
    assert_eq!(
        engine.hits("/xqydbg/v1/disconnect/App%20Server")[0].method,
        "POST"
    );
}
