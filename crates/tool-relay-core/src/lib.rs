// crates/tool-relay-core/src/lib.rs
// ============================================================================
// Module: Tool Relay Core
// Description: Envelope model, tool capability, and tool registry.
// Purpose: Define the tool-invocation contract shared by the relay crates.
// Dependencies: serde, serde_json, async-trait, tokio-util, tracing
// ============================================================================

//! ## Overview
//! `tool-relay-core` defines the request/response envelopes exchanged at the
//! HTTP boundary, the [`Tool`] capability every pluggable handler implements,
//! and the [`ToolRegistry`] that resolves tool names at request time.
//! Invariants:
//! - A [`ToolResponse`] carries an error if and only if it is a failure.
//! - Registry lookups are case-insensitive and never fail.
//!
//! Security posture: request payloads are untrusted and are passed through to
//! tools verbatim; tools own their own payload validation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod envelope;
pub mod registry;
pub mod tool;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use envelope::ERROR_CODE_DEFAULT;
pub use envelope::ERROR_CODE_INVALID_PAYLOAD;
pub use envelope::ERROR_CODE_PAYLOAD_TOO_LARGE;
pub use envelope::ERROR_CODE_SERVER_ERROR;
pub use envelope::ERROR_CODE_TOOL_NOT_FOUND;
pub use envelope::EnvelopeError;
pub use envelope::ErrorInfo;
pub use envelope::ToolRequest;
pub use envelope::ToolResponse;
pub use registry::RegistryError;
pub use registry::ToolRegistry;
pub use registry::ToolSummary;
pub use tool::LogLevel;
pub use tool::Tool;
pub use tool::ToolFault;
pub use tool::ToolLog;
pub use tool::TracingToolLog;
pub use tool::until_cancelled;
pub use tokio_util::sync::CancellationToken;
