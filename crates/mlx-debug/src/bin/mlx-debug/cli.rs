//! CLI definitions for mlx-debug.

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use mlx_client::config::keys;
use mlx_client::{ClientFactory, Dialect, RawConfig, RowQuery};

#[derive(Debug, Parser)]
#[command(
    name = "mlx-debug",
    version,
    about = "Remote XQuery and server-side JavaScript debugging client",
    infer_subcommands = true,
    after_help = "Examples:\n  mlx-debug eval -e 'xdmp:version()'\n  mlx-debug servers connectable\n  mlx-debug connect App-Services --dialect js\n  mlx-debug debug ./main.xqy -b /lib/util.xqy:12"
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings. Flags override the config file.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Config file (defaults to mlx-debug.toml in the working directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub host: Option<String>,
    /// REST server port.
    #[arg(long, global = true)]
    pub port: Option<u16>,
    #[arg(long, global = true)]
    pub manage_port: Option<u16>,
    #[arg(long, short, global = true)]
    pub user: Option<String>,
    #[arg(long, global = true)]
    pub password: Option<String>,
    /// DIGEST, BASIC or CLOUD.
    #[arg(long, global = true)]
    pub auth_type: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub ssl: bool,
    /// Accept any server certificate.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub insecure: bool,
    /// PEM file with the CA certificates to trust.
    #[arg(long, global = true)]
    pub ca: Option<PathBuf>,
    #[arg(long, global = true)]
    pub content_db: Option<String>,
    #[arg(long, global = true)]
    pub modules_db: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate a script and print its result items.
    Eval {
        #[command(flatten)]
        source: ScriptSource,
        #[arg(long, short, default_value = "xquery", value_parser = parse_dialect)]
        dialect: Dialect,
        /// Print result items as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run a row query and print the rows as JSON.
    Rows {
        #[command(flatten)]
        source: ScriptSource,
        /// optic, sql, sparql or graphql.
        #[arg(long, short, default_value = "optic", value_parser = parse_row_query)]
        kind: RowQuery,
    },
    /// List app servers.
    Servers {
        #[command(subcommand)]
        which: ServersCommand,
    },
    /// Enable debugging on an app server.
    Connect {
        server: String,
        #[arg(long, short, default_value = "xquery", value_parser = parse_dialect)]
        dialect: Dialect,
    },
    /// Disable debugging on an app server.
    Disconnect {
        server: String,
        #[arg(long, short, default_value = "xquery", value_parser = parse_dialect)]
        dialect: Dialect,
    },
    /// List requests paused on an app server.
    Paused {
        server: String,
        #[arg(long, short, default_value = "xquery", value_parser = parse_dialect)]
        dialect: Dialect,
    },
    /// Launch a script under the debugger, or attach to a paused request.
    #[command(
        after_help = "Commands once paused:\n  c | n | s | o        continue, step over, step into, step out\n  stack                print the stack\n  eval <expr>          evaluate in the selected frame\n  frame <id>           select a call frame (empty for the top frame)\n  props <id>           print an object's properties\n  break <uri:line>     set a breakpoint\n  clear <uri:line>     remove a breakpoint\n  detach               leave the request running and exit\n  quit                 cancel the request and exit"
    )]
    Debug {
        /// Script to launch.
        #[arg(required_unless_present = "attach", conflicts_with = "attach")]
        script: Option<PathBuf>,
        /// Attach to an already paused request id instead of launching.
        #[arg(long)]
        attach: Option<String>,
        /// Defaults from the script extension (.sjs/.js is JavaScript).
        #[arg(long, short, value_parser = parse_dialect)]
        dialect: Option<Dialect>,
        /// Breakpoints as uri:line or uri:line:column.
        #[arg(long = "break", short = 'b')]
        breakpoints: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServersCommand {
    /// Servers a debug session can connect to.
    Connectable,
    /// Servers with an active debug session.
    Connected,
}

/// Script text from a file or the command line.
#[derive(Debug, Args)]
pub struct ScriptSource {
    /// Script file.
    #[arg(conflicts_with = "expr", required_unless_present = "expr")]
    pub file: Option<PathBuf>,
    /// Inline script text.
    #[arg(long, short)]
    pub expr: Option<String>,
}

impl ScriptSource {
    pub fn read(&self) -> anyhow::Result<String> {
        match (&self.expr, &self.file) {
            (Some(expr), _) => Ok(expr.clone()),
            (None, Some(file)) => std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display())),
            (None, None) => anyhow::bail!("either a script file or --expr is required"),
        }
    }
}

fn parse_dialect(text: &str) -> Result<Dialect, String> {
    Dialect::parse(text).ok_or_else(|| format!("unknown dialect '{text}'"))
}

fn parse_row_query(text: &str) -> Result<RowQuery, String> {
    RowQuery::parse(text).ok_or_else(|| format!("unknown query kind '{text}'"))
}

/// Settings used when neither the config file nor a flag sets them.
fn defaults() -> RawConfig {
    RawConfig::new()
        .with(keys::HOST, "localhost")
        .with(keys::PORT, 8000)
        .with(keys::MANAGE_PORT, 8002)
        .with(keys::ADMIN_PORT, 8001)
        .with(keys::TEST_PORT, 8054)
        .with(keys::AUTH_TYPE, "DIGEST")
        .with(keys::USER, "")
        .with(keys::PASSWORD, "")
}

impl ConnectionArgs {
    fn overrides(&self) -> RawConfig {
        let mut raw = RawConfig::new();
        raw.set_opt(keys::HOST, self.host.clone());
        raw.set_opt(keys::PORT, self.port);
        raw.set_opt(keys::MANAGE_PORT, self.manage_port);
        raw.set_opt(keys::USER, self.user.clone());
        raw.set_opt(keys::PASSWORD, self.password.clone());
        raw.set_opt(keys::AUTH_TYPE, self.auth_type.clone());
        raw.set_opt(
            keys::PATH_TO_CA,
            self.ca.as_ref().map(|path| path.display().to_string()),
        );
        raw.set_opt(keys::CONTENT_DB, self.content_db.clone());
        raw.set_opt(keys::MODULES_DB, self.modules_db.clone());
        if self.ssl {
            raw.set(keys::SSL, true);
        }
        if self.insecure {
            raw.set(keys::REJECT_UNAUTHORIZED, false);
        }
        raw
    }

    fn file_settings(&self) -> anyhow::Result<RawConfig> {
        if let Some(path) = &self.config {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return Ok(RawConfig::from_toml_str(&contents)?);
        }
        let root = std::env::current_dir().context("no working directory")?;
        Ok(RawConfig::load(&root)?)
    }

    /// Defaults, then the config file, then flags.
    pub fn settings(&self) -> anyhow::Result<RawConfig> {
        Ok(defaults()
            .merged(&self.file_settings()?)
            .merged(&self.overrides()))
    }

    pub fn factory(&self) -> anyhow::Result<ClientFactory> {
        ClientFactory::from_raw(&self.settings()?).context("invalid connection settings")
    }
}
