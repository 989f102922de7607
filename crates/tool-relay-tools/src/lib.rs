// crates/tool-relay-tools/src/lib.rs
// ============================================================================
// Module: Tool Relay Built-in Tools
// Description: Operational tools shipped with the relay.
// Purpose: Provide log search and broker status tools plus registration.
// Dependencies: tool-relay-core, tool-relay-config, reqwest, tokio
// ============================================================================

//! ## Overview
//! Built-in tools are constructed from [`RelayConfig`] and registered at
//! startup. Each tool reports backend failures as failure envelopes with a
//! tool-specific error code and never lets backend errors escape as faults.
//!
//! | Tool            | Backend                 | Failure code              |
//! |-----------------|-------------------------|---------------------------|
//! | `logs.search`   | OpenSearch `_search`    | `opensearch_error`        |
//! | `rabbit.status` | AMQP 0-9-1 handshake    | `rabbit_connection_error` |

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod amqp;
pub mod broker;
pub mod search;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tool_relay_config::RelayConfig;
use tool_relay_core::RegistryError;
use tool_relay_core::Tool;
use tool_relay_core::ToolRegistry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use broker::BROKER_STATUS_TOOL;
pub use broker::BrokerStatusTool;
pub use broker::ERROR_CODE_RABBIT_CONNECTION;
pub use search::ERROR_CODE_OPENSEARCH;
pub use search::LOG_SEARCH_TOOL;
pub use search::LogSearchTool;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Builds every built-in tool from configuration.
///
/// # Errors
///
/// Returns [`ToolInitError`] when a tool cannot be constructed.
pub fn builtin_tools(config: &RelayConfig) -> Result<Vec<Arc<dyn Tool>>, ToolInitError> {
    Ok(vec![
        Arc::new(LogSearchTool::new(&config.opensearch)?),
        Arc::new(BrokerStatusTool::new(config.rabbitmq.clone())),
    ])
}

/// Registers every built-in tool into `registry`.
///
/// # Errors
///
/// Returns [`ToolInitError`] when a tool cannot be constructed or registered.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    config: &RelayConfig,
) -> Result<(), ToolInitError> {
    for tool in builtin_tools(config)? {
        registry.register(tool)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Built-in tool construction errors.
#[derive(Debug, Error)]
pub enum ToolInitError {
    /// HTTP client construction failed.
    #[error("http client error: {0}")]
    HttpClient(String),
    /// Registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
