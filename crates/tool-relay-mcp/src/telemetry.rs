// crates/tool-relay-mcp/src/telemetry.rs
// ============================================================================
// Module: Dispatch Telemetry
// Description: Metric events and request spans for tool dispatch.
// Purpose: Observe dispatch outcomes without binding to a metrics backend.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Every dispatched request ends in exactly one [`DispatchOutcome`], reported
//! to a [`DispatchMetrics`] sink together with its status code and latency.
//! [`RequestSpan`] wraps the per-request `mcp.request` tracing span and keeps
//! a copy of what it recorded so callers can inspect it without a subscriber.
//! Security posture: correlation identifiers are caller-supplied and must be
//! treated as untrusted labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use tracing::Span;
use tracing::field;

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Terminal dispatch outcome.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Tool succeeded.
    Ok,
    /// Tool returned a failure envelope.
    ToolFailure,
    /// No tool matched the requested name.
    NotFound,
    /// Request body exceeded the configured limit.
    PayloadTooLarge,
    /// Request was cancelled before a response was written.
    Cancelled,
    /// Unclassified fault inside the dispatcher or tool.
    Faulted,
}

impl DispatchOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ToolFailure => "tool_failure",
            Self::NotFound => "not_found",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
        }
    }
}

/// Dispatch metric event.
///
/// # Invariants
/// - `tool` is empty when the request body did not name a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Requested tool name, as sent by the caller.
    pub tool: String,
    /// Caller-supplied correlation identifier.
    pub correlation_id: Option<String>,
    /// Terminal outcome.
    pub outcome: DispatchOutcome,
    /// HTTP status code written.
    pub status: u16,
    /// Time from request entry to response.
    pub latency: Duration,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for dispatch outcomes.
pub trait DispatchMetrics: Send + Sync {
    /// Records one terminal dispatch outcome.
    fn record_dispatch(&self, event: DispatchEvent);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl DispatchMetrics for NoopMetrics {
    fn record_dispatch(&self, _event: DispatchEvent) {}
}

// ============================================================================
// SECTION: Request Span
// ============================================================================

/// Status recorded on a request span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    /// No status recorded yet.
    Unset,
    /// Request completed successfully.
    Ok,
    /// Request failed with a description.
    Error(String),
}

/// Handle to the `mcp.request` span of one dispatched request.
#[derive(Debug)]
pub struct RequestSpan {
    /// Underlying tracing span.
    span: Span,
    /// Recorded tool name.
    tool: String,
    /// Recorded correlation identifier.
    correlation_id: Option<String>,
    /// Last recorded status.
    status: SpanStatus,
}

impl Default for RequestSpan {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestSpan {
    /// Opens a new request span with empty fields.
    #[must_use]
    pub fn new() -> Self {
        let span = tracing::info_span!(
            "mcp.request",
            tool = field::Empty,
            correlation_id = field::Empty,
            otel.status_code = field::Empty,
            otel.status_description = field::Empty,
        );
        Self {
            span,
            tool: String::new(),
            correlation_id: None,
            status: SpanStatus::Unset,
        }
    }

    /// Returns the underlying tracing span.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Records the requested tool name.
    pub fn set_tool(&mut self, tool: &str) {
        self.span.record("tool", tool);
        self.tool = tool.to_string();
    }

    /// Records the correlation identifier, when present.
    pub fn set_correlation_id(&mut self, correlation_id: Option<&str>) {
        if let Some(id) = correlation_id {
            self.span.record("correlation_id", id);
        }
        self.correlation_id = correlation_id.map(str::to_string);
    }

    /// Marks the request successful.
    pub fn set_ok(&mut self) {
        self.span.record("otel.status_code", "OK");
        self.status = SpanStatus::Ok;
    }

    /// Marks the request failed.
    pub fn set_error(&mut self, description: &str) {
        self.span.record("otel.status_code", "ERROR");
        self.span.record("otel.status_description", description);
        self.status = SpanStatus::Error(description.to_string());
    }

    /// Returns the recorded tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the recorded correlation identifier.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the last recorded status.
    #[must_use]
    pub const fn status(&self) -> &SpanStatus {
        &self.status
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
