//! CLI entrypoint for the remote debugging client.

#[path = "mlx-debug/cli.rs"]
mod cli;
#[path = "mlx-debug/repl.rs"]
mod repl;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use mlx_client::dispatch;
use mlx_client::{ClientFactory, DatabaseConnection, Dialect, EvalEntry, RawConfig, Role};
use mlx_debug::{discovery, JavascriptRuntime, XqueryRuntime};
use tracing::info;

use cli::{Cli, Command, ServersCommand};
use repl::Start;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("mlx-debug error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let factory = cli.connection.factory()?;
    match cli.command {
        Command::Eval {
            source,
            dialect,
            json,
        } => {
            let script = source.read()?;
            let rest = client(&factory, Role::Rest)?;
            let items = rest.evaluate(&script, dialect, EvalEntry::Eval).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in items {
                    println!("{}", item.value);
                }
            }
        }
        Command::Rows { source, kind } => {
            let query = source.read()?;
            let rest = client(&factory, Role::Rest)?;
            let result = dispatch::send_rows(&rest, &query, kind).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Servers { which } => {
            let rest = client(&factory, Role::Rest)?;
            let own_port = rest.params().port;
            match which {
                ServersCommand::Connectable => {
                    for server in discovery::list_connectable_servers(&rest, own_port).await {
                        println!("{}\t{}\t{}", server.label, server.description, server.detail);
                    }
                }
                ServersCommand::Connected => {
                    let manage = client(&factory, Role::Manage)?;
                    let report = |servers: &[String]| info!("{} server(s) connected", servers.len());
                    let servers =
                        discovery::get_connected_servers(&rest, &manage, own_port, Some(&report))
                            .await;
                    for server in servers {
                        println!("{server}");
                    }
                }
            }
        }
        Command::Connect { server, dialect } => {
            let manage = client(&factory, Role::Manage)?;
            discovery::connect_server(&manage, &server, dialect).await?;
            println!("{} debugging enabled on {server}", dialect.tag());
        }
        Command::Disconnect { server, dialect } => {
            let manage = client(&factory, Role::Manage)?;
            discovery::disconnect_server(&manage, &server, dialect).await?;
            println!("{} debugging disabled on {server}", dialect.tag());
        }
        Command::Paused { server, dialect } => {
            let manage = client(&factory, Role::Manage)?;
            for id in discovery::list_paused_requests(&manage, &server, dialect).await? {
                println!("{id}");
            }
        }
        Command::Debug {
            script,
            attach,
            dialect,
            breakpoints,
        } => {
            let dialect = dialect
                .or_else(|| script.as_deref().map(dialect_for))
                .unwrap_or(Dialect::Xquery);
            let start = match (&attach, &script) {
                (Some(id), _) => Start::Attach(id),
                (None, Some(script)) => Start::Launch(script),
                (None, None) => anyhow::bail!("either a script or --attach is required"),
            };
            let rest = client(&factory, Role::Rest)?;
            match dialect {
                Dialect::Xquery => repl::drive(XqueryRuntime::new(rest), start, &breakpoints).await?,
                Dialect::Javascript => {
                    repl::drive(JavascriptRuntime::new(rest), start, &breakpoints).await?;
                }
            }
        }
    }
    Ok(())
}

fn client(factory: &ClientFactory, role: Role) -> anyhow::Result<DatabaseConnection> {
    factory
        .new_client(role, &RawConfig::new())
        .with_context(|| format!("failed to create {role} client"))
}

fn dialect_for(script: &Path) -> Dialect {
    match script.extension().and_then(|ext| ext.to_str()) {
        Some("sjs" | "js" | "mjs") => Dialect::Javascript,
        _ => Dialect::Xquery,
    }
}
