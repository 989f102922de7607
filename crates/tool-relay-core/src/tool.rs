// crates/tool-relay-core/src/tool.rs
// ============================================================================
// Module: Tool Capability
// Description: Contract implemented by every pluggable tool handler.
// Purpose: Decouple the dispatcher from concrete tool implementations.
// Dependencies: async-trait, tokio-util, tracing, thiserror
// ============================================================================

//! ## Overview
//! A [`Tool`] has a registry name, a human-readable description, and a single
//! async `execute` operation. Tools receive the parsed [`ToolRequest`], a
//! [`ToolLog`] sink, and the request's [`CancellationToken`].
//!
//! ## Invariants
//! - Domain failures are returned as failure envelopes, not as faults.
//! - [`ToolFault::Cancelled`] is only returned after the token fired.
//! - [`ToolFault::Internal`] detail text is never shown to callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::envelope::ToolRequest;
use crate::envelope::ToolResponse;

// ============================================================================
// SECTION: Tool Trait
// ============================================================================

/// Pluggable tool handler.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key, recommended in dotted form such as `logs.search`.
    fn name(&self) -> &str;

    /// Human-readable description used for listings.
    fn description(&self) -> &str;

    /// Executes the tool for a single request.
    ///
    /// # Errors
    ///
    /// Returns [`ToolFault::Cancelled`] when `cancel` fires before completion
    /// and [`ToolFault::Internal`] for unexpected faults. Expected failures
    /// are reported as failure envelopes instead.
    async fn execute(
        &self,
        request: &ToolRequest,
        log: &dyn ToolLog,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault>;
}

/// Faults that escape a tool instead of becoming a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFault {
    /// The request's cancellation token fired.
    #[error("tool execution cancelled")]
    Cancelled,
    /// An unexpected fault inside the tool.
    #[error("tool fault: {0}")]
    Internal(String),
}

impl ToolFault {
    /// Wraps an arbitrary error as an internal fault.
    #[must_use]
    pub fn internal(detail: impl Display) -> Self {
        Self::Internal(detail.to_string())
    }
}

/// Awaits `future` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`ToolFault::Cancelled`] when the token fires before the future
/// completes.
pub async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, ToolFault> {
    if cancel.is_cancelled() {
        return Err(ToolFault::Cancelled);
    }
    cancel.run_until_cancelled(future).await.ok_or(ToolFault::Cancelled)
}

// ============================================================================
// SECTION: Logging Sink
// ============================================================================

/// Log levels available to tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recoverable anomaly.
    Warn,
    /// Failure.
    Error,
}

impl LogLevel {
    /// Returns a stable label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Leveled log sink handed to tools.
pub trait ToolLog: Send + Sync {
    /// Emits a log entry at `level`.
    fn log(&self, level: LogLevel, message: &str);

    /// Emits a debug entry.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Emits an info entry.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Emits a warning entry.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Emits an error entry.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// [`ToolLog`] that forwards entries to `tracing`, tagged with the tool name
/// and correlation identifier.
#[derive(Debug, Clone)]
pub struct TracingToolLog {
    /// Tool name attached to every entry.
    tool: String,
    /// Correlation identifier attached to every entry.
    correlation_id: Option<String>,
}

impl TracingToolLog {
    /// Creates a sink for the given tool and request.
    #[must_use]
    pub fn new(tool: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            tool: tool.into(),
            correlation_id,
        }
    }

    /// Creates a sink for the request's tool and correlation identifier.
    #[must_use]
    pub fn for_request(request: &ToolRequest) -> Self {
        Self::new(request.tool.clone(), request.correlation_id.clone())
    }
}

impl ToolLog for TracingToolLog {
    fn log(&self, level: LogLevel, message: &str) {
        let tool = self.tool.as_str();
        let correlation_id = self.correlation_id.as_deref().unwrap_or_default();
        match level {
            LogLevel::Debug => tracing::debug!(tool, correlation_id, "{message}"),
            LogLevel::Info => tracing::info!(tool, correlation_id, "{message}"),
            LogLevel::Warn => tracing::warn!(tool, correlation_id, "{message}"),
            LogLevel::Error => tracing::error!(tool, correlation_id, "{message}"),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
