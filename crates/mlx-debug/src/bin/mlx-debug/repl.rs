//! Interactive driver for one debug session.

use std::path::Path;

use anyhow::Context;
use mlx_debug::{Breakpoint, DebugRuntime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplCommand {
    Continue,
    StepOver,
    StepInto,
    StepOut,
    Stack,
    Eval(String),
    Frame(String),
    Props(String),
    Break(String),
    Clear(String),
    Detach,
    Quit,
}

impl ReplCommand {
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));
        let command = match word {
            "c" | "continue" => Self::Continue,
            "n" | "next" => Self::StepOver,
            "s" | "step" => Self::StepInto,
            "o" | "out" => Self::StepOut,
            "stack" | "bt" => Self::Stack,
            "eval" | "p" if !rest.is_empty() => Self::Eval(rest.to_string()),
            "frame" => Self::Frame(rest.to_string()),
            "props" if !rest.is_empty() => Self::Props(rest.to_string()),
            "break" | "b" if !rest.is_empty() => Self::Break(rest.to_string()),
            "clear" if !rest.is_empty() => Self::Clear(rest.to_string()),
            "detach" => Self::Detach,
            "quit" | "q" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// How a session starts.
pub(crate) enum Start<'a> {
    Launch(&'a Path),
    Attach(&'a str),
}

/// Start the session, install breakpoints, then run commands from stdin
/// until `detach`, `quit` or end of input.
pub(crate) async fn drive<R: DebugRuntime>(
    mut runtime: R,
    start: Start<'_>,
    breakpoints: &[String],
) -> anyhow::Result<()> {
    let request_id = match start {
        Start::Launch(script) => runtime
            .launch(script)
            .await
            .with_context(|| format!("failed to launch {}", script.display()))?,
        Start::Attach(id) => {
            runtime
                .attach(id)
                .await
                .with_context(|| format!("failed to attach to request {id}"))?;
            id.to_string()
        }
    };
    info!("{} session {request_id} {}", runtime.dialect().tag(), runtime.state());

    let mut installed = Vec::new();
    for text in breakpoints {
        set_breakpoint(&runtime, &mut installed, text).await;
    }
    report_pause(&runtime).await;

    let mut frame = String::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = ReplCommand::parse(&line) else {
            println!("unknown command: {}", line.trim());
            continue;
        };
        let outcome = match command {
            ReplCommand::Continue => step(&runtime, runtime.resume()).await,
            ReplCommand::StepOver => step(&runtime, runtime.step_over()).await,
            ReplCommand::StepInto => step(&runtime, runtime.step_into()).await,
            ReplCommand::StepOut => step(&runtime, runtime.step_out()).await,
            ReplCommand::Stack => runtime.stack_trace().await.map(|stack| println!("{stack}")),
            ReplCommand::Eval(expr) => runtime
                .evaluate_on_call_frame(&expr, &frame)
                .await
                .map(|value| println!("{value}")),
            ReplCommand::Frame(id) => {
                frame = id;
                Ok(())
            }
            ReplCommand::Props(id) => runtime.properties(&id).await.map(|props| println!("{props}")),
            ReplCommand::Break(text) => {
                set_breakpoint(&runtime, &mut installed, &text).await;
                Ok(())
            }
            ReplCommand::Clear(text) => {
                clear_breakpoint(&runtime, &mut installed, &text).await;
                Ok(())
            }
            ReplCommand::Detach => {
                runtime.disable().await.context("failed to detach")?;
                println!("detached from request {request_id}");
                return Ok(());
            }
            ReplCommand::Quit => break,
        };
        if let Err(err) = outcome {
            println!("error: {err}");
        }
    }

    runtime.terminate().await?;
    println!("request {request_id} cancelled");
    Ok(())
}

async fn step<R, F>(runtime: &R, action: F) -> mlx_debug::DebugResult<()>
where
    R: DebugRuntime,
    F: std::future::Future<Output = mlx_debug::DebugResult<()>>,
{
    action.await?;
    let status = runtime.wait_till_paused().await?;
    println!("paused: {status}");
    Ok(())
}

async fn report_pause<R: DebugRuntime>(runtime: &R) {
    match runtime.wait_till_paused().await {
        Ok(status) => println!("paused: {status}"),
        Err(err) => warn!("waiting for pause failed: {err}"),
    }
}

async fn set_breakpoint<R: DebugRuntime>(runtime: &R, installed: &mut Vec<Breakpoint>, text: &str) {
    let Some(mut breakpoint) = Breakpoint::parse(text) else {
        println!("invalid breakpoint '{text}', expected uri:line[:column]");
        return;
    };
    match runtime.set_breakpoint(&mut breakpoint).await {
        Ok(()) => {
            println!("breakpoint set at {}:{}", breakpoint.uri, breakpoint.line);
            installed.push(breakpoint);
        }
        Err(err) => println!("breakpoint {text} not set: {err}"),
    }
}

async fn clear_breakpoint<R: DebugRuntime>(
    runtime: &R,
    installed: &mut Vec<Breakpoint>,
    text: &str,
) {
    let Some(wanted) = Breakpoint::parse(text) else {
        println!("invalid breakpoint '{text}', expected uri:line[:column]");
        return;
    };
    let Some(index) = installed
        .iter()
        .position(|bp| bp.uri == wanted.uri && bp.line == wanted.line)
    else {
        println!("no breakpoint at {}:{}", wanted.uri, wanted.line);
        return;
    };
    match runtime.remove_breakpoint(&mut installed[index]).await {
        Ok(()) => {
            installed.remove(index);
            println!("breakpoint cleared at {}:{}", wanted.uri, wanted.line);
        }
        Err(err) => println!("breakpoint {text} not cleared: {err}"),
    }
}
