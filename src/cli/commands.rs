use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use http::Method;
use std::io::Write;
use std::path::PathBuf;

use crate::config::RouterConfig;
use crate::dispatcher::Dispatcher;
use crate::logging::{init_logging, LogConfig};
use crate::manifest::Manifest;
use crate::server::{status_reason, Request};

/// Command-line interface for stagerouter
///
/// Loads a route manifest into a dispatcher and inspects or exercises it.
#[derive(Parser, Debug)]
#[command(name = "stagerouter")]
#[command(about = "Inspect and exercise a route manifest", long_about = None)]
pub struct Cli {
    /// Router configuration (YAML or TOML)
    #[arg(short, long, global = true, env = "STAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level pretty logs with source locations, ignoring `STAGER_LOG_*`
    #[arg(long, global = true)]
    pub dev: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered routes
    Routes {
        /// Route manifest (YAML)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Show which route a method and path resolve to
    Resolve {
        #[arg(short, long)]
        manifest: PathBuf,
        method: String,
        path: String,
    },
    /// Push one request through the full pipeline and print the response
    Request {
        #[arg(short, long)]
        manifest: PathBuf,
        method: String,
        /// Path with optional query string
        target: String,
        /// Request header, `name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

impl Cli {
    /// Logging setup selected by `--dev` or the environment.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        if self.dev {
            LogConfig::default_dev()
        } else {
            LogConfig::from_env()
        }
    }
}

/// Parse arguments, set up logging and run.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_config()) {
        eprintln!("Warning: {e:#}");
    }
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

/// Run a parsed command, writing its output to `out`.
pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RouterConfig::load(path)?,
        None => RouterConfig::from_env()?,
    };

    match cli.command {
        Commands::Routes { manifest } => {
            let dispatcher = build(config, &manifest)?;
            for (method, pattern) in dispatcher.routes() {
                writeln!(out, "{:<8} {pattern}", method.as_str())?;
            }
        }
        Commands::Resolve {
            manifest,
            method,
            path,
        } => {
            let dispatcher = build(config, &manifest)?;
            let method = parse_method(&method)?;
            let report = match dispatcher.resolve(&method, &path) {
                Ok(found) => serde_json::json!({
                    "status": 200,
                    "pattern": found.entry.pattern().as_str(),
                    "kind": found.entry.target().kind(),
                    "params": found.path_params_map(),
                }),
                Err(miss) => serde_json::json!({
                    "status": miss.status(),
                    "error": miss.to_string(),
                }),
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        Commands::Request {
            manifest,
            method,
            target,
            headers,
            body,
        } => {
            let dispatcher = build(config, &manifest)?;
            let mut request = Request::new(parse_method(&method)?, &target);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| anyhow!("header must be 'name: value', got '{header}'"))?;
                request = request.with_header(name.trim(), value.trim());
            }
            if let Some(body) = body {
                request = request.with_body(body);
            }
            let response = dispatcher.serve(request);
            writeln!(
                out,
                "{} {}",
                response.status,
                status_reason(response.status)
            )?;
            for (name, value) in &response.headers {
                writeln!(out, "{name}: {value}")?;
            }
            writeln!(out)?;
            writeln!(out, "{}", response.body_str())?;
        }
    }
    Ok(())
}

fn build(config: RouterConfig, manifest: &PathBuf) -> Result<Dispatcher> {
    let dispatcher = Dispatcher::with_config(config);
    Manifest::load(manifest)?
        .apply(&dispatcher)
        .with_context(|| format!("registering {}", manifest.display()))?;
    Ok(dispatcher)
}

fn parse_method(token: &str) -> Result<Method> {
    Method::from_bytes(token.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid HTTP method '{token}'"))
}
