// crates/tool-relay-mcp/src/lib.rs
// ============================================================================
// Module: Tool Relay MCP
// Description: HTTP dispatcher and hosting server for tool envelopes.
// Purpose: Expose registered tools under a reserved HTTP path prefix.
// Dependencies: axum, tokio, tracing, tool-relay-core, tool-relay-config
// ============================================================================

//! ## Overview
//! `tool-relay-mcp` turns HTTP requests under the reserved prefix (default
//! `/mcp`) into tool invocations. The [`dispatcher`] owns the per-request
//! state machine, [`telemetry`] reports outcomes, and [`server`] assembles
//! the axum pipeline around them.
//!
//! Security posture: request bodies and correlation identifiers are
//! untrusted; fault detail is logged, never returned to callers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatcher;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatcher::Dispatcher;
pub use dispatcher::INTERNAL_ERROR_MESSAGE;
pub use dispatcher::STATUS_CLIENT_CLOSED_REQUEST;
pub use dispatcher::dispatch_middleware;
pub use server::McpServer;
pub use server::McpServerError;
pub use telemetry::DispatchEvent;
pub use telemetry::DispatchMetrics;
pub use telemetry::DispatchOutcome;
pub use telemetry::NoopMetrics;
pub use telemetry::RequestSpan;
pub use telemetry::SpanStatus;
