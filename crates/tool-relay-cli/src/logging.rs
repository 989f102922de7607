// crates/tool-relay-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: tracing-subscriber initialization from relay configuration.
// Purpose: Install one global subscriber writing to stderr.
// Dependencies: tracing-subscriber, tool-relay-config
// ============================================================================

//! ## Overview
//! `RUST_LOG` takes precedence over `logging.level`. Output goes to stderr so
//! command output on stdout stays machine-readable.

use tool_relay_config::LogFormat;
use tool_relay_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured level.
const LOG_ENV_VAR: &str = "RUST_LOG";

/// Builds the level filter from an optional environment override.
pub(crate) fn build_filter(level: &str, env_override: Option<&str>) -> Result<EnvFilter, String> {
    let directives = env_override.filter(|value| !value.trim().is_empty()).unwrap_or(level);
    EnvFilter::try_new(directives).map_err(|err| format!("invalid log filter '{directives}': {err}"))
}

/// Installs the global subscriber.
pub(crate) fn init(config: &LoggingConfig) -> Result<(), String> {
    let env_override = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(&config.level, env_override.as_deref())?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| format!("failed to install log subscriber: {err}"))
}
