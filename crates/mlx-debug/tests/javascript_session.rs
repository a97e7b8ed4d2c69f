mod common;

use common::{multipart, ok, status, MockEngine};
use mlx_client::config::keys;
use mlx_client::{ClientError, Dialect, EvalEntry, RawConfig, Role};
use mlx_debug::{Breakpoint, DebugError, DebugRuntime, JavascriptRuntime, SessionState};

fn engine() -> MockEngine {
    MockEngine::start(|seen| match seen.path() {
        "/jsdbg/v1/eval" => ok("  5551\n"),
        "/v1/eval" => multipart(&["2"]),
        "/jsdbg/v1/stack-trace/5551" => ok(r#"{"callFrames":[]}"#),
        "/jsdbg/v1/eval-on-call-frame/5551" => ok(r#"{"result":{"value":3}}"#),
        _ => ok(""),
    })
}

async fn launched(engine: &MockEngine) -> JavascriptRuntime {
    let mut runtime = JavascriptRuntime::new(engine.connection(Role::Rest));
    runtime.launch_script("const a = 1;").await.unwrap();
    runtime
}

#[tokio::test]
async fn launch_posts_script_and_database_selection() {
    let engine = engine();
    let overrides = RawConfig::new()
        .with(keys::CONTENT_DB, "Documents")
        .with(keys::MODULES_DB, "Modules");
    let mut runtime = JavascriptRuntime::new(engine.connection_with(Role::Rest, &overrides));

    let id = runtime.launch_script("fn.currentDateTime()").await.unwrap();
    assert_eq!(id, "5551");
    assert_eq!(runtime.state(), SessionState::Launched);

    let launches = engine.hits("/jsdbg/v1/eval");
    assert_eq!(launches[0].method, "POST");
    let form = launches[0].form();
    assert_eq!(form["javascript"], "fn.currentDateTime()");
    assert_eq!(form["database"], "Documents");
    assert_eq!(form["modules"], "Modules");
}

#[tokio::test]
async fn launch_omits_unset_databases() {
    let engine = engine();
    launched(&engine).await;

    let form = engine.hits("/jsdbg/v1/eval")[0].form();
    assert!(!form.contains_key("database"));
    assert!(!form.contains_key("modules"));
}

#[tokio::test]
async fn failed_launch_enters_error_state() {
    let engine = MockEngine::start(|_| status(401));
    let mut runtime = JavascriptRuntime::new(engine.connection(Role::Rest));

    let err = runtime.launch_script("x").await.unwrap_err();
    assert!(matches!(
        err,
        DebugError::Protocol(ClientError::Status { status: 401, .. })
    ));
    assert_eq!(runtime.state(), SessionState::Error);
    assert_eq!(runtime.request_id(), None);
}

#[tokio::test]
async fn control_calls_use_the_javascript_verbs() {
    let engine = engine();
    let runtime = launched(&engine).await;

    runtime.resume().await.unwrap();
    runtime.step_over().await.unwrap();
    runtime.step_into().await.unwrap();
    runtime.step_out().await.unwrap();
    runtime.disable().await.unwrap();

    let control = engine
        .requests()
        .into_iter()
        .skip(1)
        .map(|seen| (seen.method, seen.url))
        .collect::<Vec<_>>();
    let expected = [
        "/jsdbg/v1/resume/5551",
        "/jsdbg/v1/step-over/5551",
        "/jsdbg/v1/step-into/5551",
        "/jsdbg/v1/step-out/5551",
        "/jsdbg/v1/disable/5551",
    ]
    .map(|url| ("POST".to_string(), url.to_string()));
    assert_eq!(control, expected);
}

#[tokio::test]
async fn breakpoints_are_sent_by_position_without_lookup() {
    let engine = engine();
    let runtime = launched(&engine).await;
    let mut breakpoint = Breakpoint::new("/app/orders.sjs", 12)
        .with_column(5)
        .with_condition("total > 100");

    runtime.set_breakpoint(&mut breakpoint).await.unwrap();
    runtime.remove_breakpoint(&mut breakpoint).await.unwrap();

    let set = engine.hits("/jsdbg/v1/set-breakpoint/5551");
    assert_eq!(set.len(), 1);
    let form = set[0].form();
    assert_eq!(form["url"], "/app/orders.sjs");
    assert_eq!(form["lineNumber"], "11");
    assert_eq!(form["columnNumber"], "4");
    assert_eq!(form["condition"], "total > 100");

    let removed = engine.hits("/jsdbg/v1/remove-breakpoint/5551");
    assert_eq!(removed.len(), 1);
    assert!(!removed[0].form().contains_key("condition"));
    assert_eq!(breakpoint.expr_id(), None);
    assert_eq!(engine.requests().len(), 3);
}

#[tokio::test]
async fn inspection_and_frame_evaluation() {
    let engine = engine();
    let runtime = launched(&engine).await;

    assert_eq!(runtime.stack_trace().await.unwrap(), r#"{"callFrames":[]}"#);
    runtime.evaluate_on_call_frame("a + 1", "").await.unwrap();
    runtime.evaluate_on_call_frame("a + 1", "frame-0").await.unwrap();

    let evals = engine.hits("/jsdbg/v1/eval-on-call-frame/5551");
    assert!(evals.iter().all(|seen| seen.method == "GET"));
    assert_eq!(evals[0].query()["expr"], "a + 1");
    assert!(!evals[0].query().contains_key("call-frame"));
    assert_eq!(evals[1].query()["call-frame"], "frame-0");
}

#[tokio::test]
async fn terminate_cancels_and_clears_the_request() {
    let engine = engine();
    let mut runtime = launched(&engine).await;

    runtime.terminate().await.unwrap();
    assert_eq!(runtime.state(), SessionState::Shutdown);
    assert_eq!(runtime.request_id(), None);
    assert_eq!(engine.hits("/jsdbg/v1/request-cancel/5551").len(), 1);

    runtime.terminate().await.unwrap();
    assert_eq!(engine.hits("/jsdbg/v1/request-cancel/5551").len(), 1);
}

#[tokio::test]
async fn evaluation_sends_the_envelope_and_script_variables() {
    let engine = engine();
    let overrides = RawConfig::new().with(keys::CONTENT_DB, "Documents");
    let connection = engine.connection_with(Role::Rest, &overrides);

    let items = connection
        .evaluate("1 + 1", Dialect::Javascript, EvalEntry::Eval)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].value, "2");

    let evals = engine.hits("/v1/eval");
    assert_eq!(evals.len(), 1);
    let form = evals[0].form();
    assert!(form["javascript"].contains("options.database = xdmp.database(contentDb);"));
    assert!(!form["javascript"].contains("options.modules"));
    assert!(form["javascript"].contains("xdmp.eval(actualQuery, null, options);"));
    let vars = evals[0].vars();
    assert_eq!(vars["actualQuery"], "1 + 1");
    assert_eq!(vars["contentDb"], "Documents");
    assert_eq!(vars["modulesDb"], "");
    assert!(engine.hits("/jsdbg/v1/eval").is_empty());
}

#[tokio::test]
async fn debug_evaluation_starts_a_request() {
    let engine = engine();
    let connection = engine.connection(Role::Rest);

    let items = connection
        .evaluate("const b = 2;", Dialect::Javascript, EvalEntry::DebugEval)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].value, "5551");

    let launches = engine.hits("/jsdbg/v1/eval");
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].form()["javascript"], "const b = 2;");
    assert!(engine.hits("/v1/eval").is_empty());
}

#[tokio::test]
async fn empty_launch_reply_is_an_error() {
    let engine = MockEngine::start(|_| ok("\n"));
    let mut runtime = JavascriptRuntime::new(engine.connection(Role::Rest));

    assert_eq!(
        runtime.launch_script("x").await,
        Err(DebugError::MissingRequestId)
    );
    assert_eq!(runtime.state(), SessionState::Error);
}
