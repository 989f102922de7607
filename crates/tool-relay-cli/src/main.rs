// crates/tool-relay-cli/src/main.rs
// ============================================================================
// Module: Tool Relay CLI Entry Point
// Description: Command dispatcher for serving and inspecting the relay.
// Purpose: Start the HTTP relay, list tools, and check configuration.
// Dependencies: clap, tokio, tracing-subscriber, tool-relay-mcp, tool-relay-tools
// ============================================================================

//! ## Overview
//! `tool-relay serve` loads configuration, registers the built-in tools, and
//! serves the dispatcher until Ctrl-C. `tool-relay tools` prints the
//! registered tools as JSON and `tool-relay config check` validates a
//! configuration file. Exit code 0 means success; 1 means failure, with the
//! error written to stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tool_relay_config::RelayConfig;
use tool_relay_core::ToolRegistry;
use tool_relay_mcp::McpServer;
use tool_relay_tools::register_builtin_tools;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tool-relay", version, about = "HTTP tool-invocation relay")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay HTTP server.
    Serve(ServeCommand),
    /// Print the registered tools as JSON.
    Tools(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Configuration source.
    #[command(flatten)]
    config: ConfigArgs,
    /// Override for `server.bind`.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

/// Shared configuration path argument.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to `tool-relay.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate configuration.
    Check(ConfigArgs),
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the selected command.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tools(args) => command_tools(&args),
        Commands::Config {
            command: ConfigCommand::Check(args),
        } => command_config_check(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let config = apply_bind_override(config, command.bind)?;
    logging::init(&config.logging).map_err(CliError::new)?;
    let registry = build_registry(&config)?;
    let server = McpServer::new(config, registry)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| {
        tracing::error!(error = %err, "tool relay failed");
        CliError::new(format!("server failed: {err}"))
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `tools` command.
fn command_tools(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    let registry = build_registry(&config)?;
    write_stdout_line(&render_tools(&registry)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `config check` command.
fn command_config_check(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    write_stdout_line(&format!(
        "config ok: bind={} prefix={} search={} broker={}:{}",
        config.server.bind,
        config.server.path_prefix,
        config.opensearch.search_url(),
        config.rabbitmq.host,
        config.rabbitmq.port
    ))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration from the resolved source.
fn load_config(args: &ConfigArgs) -> CliResult<RelayConfig> {
    RelayConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Applies the `--bind` override and revalidates.
fn apply_bind_override(mut config: RelayConfig, bind: Option<String>) -> CliResult<RelayConfig> {
    if let Some(bind) = bind {
        config.server.bind = bind;
        config.validate().map_err(|err| CliError::new(format!("invalid --bind: {err}")))?;
    }
    Ok(config)
}

/// Builds the registry with every built-in tool.
fn build_registry(config: &RelayConfig) -> CliResult<Arc<ToolRegistry>> {
    let registry = ToolRegistry::new();
    register_builtin_tools(&registry, config)
        .map_err(|err| CliError::new(format!("tool registration failed: {err}")))?;
    Ok(Arc::new(registry))
}

/// Renders the registry listing as pretty JSON.
fn render_tools(registry: &ToolRegistry) -> CliResult<String> {
    serde_json::to_string_pretty(&registry.list())
        .map_err(|err| CliError::new(format!("failed to render tools: {err}")))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes an error to stderr and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "tool-relay: {message}");
    ExitCode::FAILURE
}
