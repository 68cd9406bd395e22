mod agent;
mod config;
mod llm;
mod operations;
mod sandbox;
mod service;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent::{Dispatcher, InstructionPlanner};
use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};
use crate::operations::{builtin, OperationContext, OperationRegistry};
use crate::sandbox::PathGuard;

/// HTTP connect timeout for web operations, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User-Agent header sent by web operations.
const USER_AGENT: &str = concat!("taskgate/", env!("CARGO_PKG_VERSION"));

fn print_help() {
    println!(
        "\
taskgate v{}

A sandboxed task runner: plain-language instructions are mapped by an LLM
onto a fixed set of file, data and tool operations inside one workspace.

USAGE:
    taskgate [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/taskgate.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENDPOINTS:
    POST /run?task=<instruction>    Plan and run one instruction
    GET  /read?path=<path>          Read a file from the workspace

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG                 Log level filter for tracing
                             (e.g. debug, taskgate=debug,warn)
    AIPROXY_TOKEN            API key for the OpenAI-compatible endpoint
    TASKGATE_WORKSPACE       Workspace root directory (absolute path)
    TASKGATE_LLM_ENDPOINT    Chat completions URL

EXAMPLES:
    taskgate                               # uses config/taskgate.toml
    taskgate /etc/taskgate/taskgate.toml   # custom config path
    RUST_LOG=debug taskgate                # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("failed to build HTTP client")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("taskgate v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskgate=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/taskgate.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    if config.llm.provider != "openai" {
        bail!(
            "unsupported LLM provider `{}` (only `openai` is available)",
            config.llm.provider
        );
    }
    info!("LLM: {} ({})", config.llm.provider, config.llm.model);

    let guard = PathGuard::new(&config.workspace.root)?;
    info!("Workspace: {}", guard.root().display());

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(config.llm.clone()));
    info!("Oracle: {}", llm.description());

    let mut registry = OperationRegistry::new();
    for operation in builtin::all() {
        registry.register(operation)?;
    }
    info!(
        "Registered {} operations: {}",
        registry.len(),
        registry.names().join(", ")
    );

    let planner = InstructionPlanner::new(
        llm.clone(),
        &registry,
        Duration::from_secs(config.llm.timeout_secs),
    );
    let context = Arc::new(OperationContext {
        guard,
        llm,
        tools: config.tools.clone(),
        http: build_http_client()?,
    });
    let dispatcher = Arc::new(Dispatcher::new(planner, Arc::new(registry), context));

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;
    info!("Listening on http://{address}");

    axum::serve(listener, service::router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}
