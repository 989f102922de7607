// crates/tool-relay-mcp/src/dispatcher.rs
// ============================================================================
// Module: Tool Dispatcher
// Description: HTTP middleware routing tool envelopes to registered tools.
// Purpose: Translate requests under the reserved prefix into tool calls.
// Dependencies: axum, futures-util, http-body-util, tokio-util, tracing
// ============================================================================

//! ## Overview
//! [`dispatch_middleware`] intercepts requests whose path lies under the
//! reserved prefix and forwards everything else untouched. Intercepted
//! requests are parsed into a [`ToolRequest`], resolved against the
//! [`ToolRegistry`], executed, and answered with a serialized
//! [`ToolResponse`].
//!
//! | Outcome             | Status | Body                         |
//! |---------------------|--------|------------------------------|
//! | tool success        | 200    | success envelope             |
//! | tool failure        | 400    | failure envelope             |
//! | unknown tool        | 404    | `tool_not_found` envelope    |
//! | body over the limit | 413    | `payload_too_large` envelope |
//! | cancelled           | 499    | empty                        |
//! | fault or panic      | 500    | `server_error` envelope      |
//!
//! Fault detail is logged and recorded on the span but never written to the
//! response body. Every envelope written carries the request correlation id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::body::Bytes;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use futures_util::FutureExt;
use http_body_util::BodyExt;
use http_body_util::LengthLimitError;
use http_body_util::Limited;
use tool_relay_config::ServerConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::ERROR_CODE_PAYLOAD_TOO_LARGE;
use tool_relay_core::ERROR_CODE_SERVER_ERROR;
use tool_relay_core::ERROR_CODE_TOOL_NOT_FOUND;
use tool_relay_core::ToolFault;
use tool_relay_core::ToolRegistry;
use tool_relay_core::ToolRequest;
use tool_relay_core::ToolResponse;
use tool_relay_core::TracingToolLog;
use tool_relay_core::until_cancelled;
use tracing::Instrument;

use crate::telemetry::DispatchEvent;
use crate::telemetry::DispatchMetrics;
use crate::telemetry::DispatchOutcome;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RequestSpan;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Non-standard status written when a request is cancelled.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;
/// Message of the generic internal error envelope.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error while processing the tool request.";
/// Body written when even the internal error envelope cannot be serialized.
const FALLBACK_ERROR_BODY: &str = r#"{"success":false,"message":"Internal error while processing the tool request.","error":{"code":"server_error","detail":"Internal error while processing the tool request."},"data":{},"correlationId":null}"#;

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes tool envelopes under a reserved path prefix.
pub struct Dispatcher {
    /// Registry consulted on every request.
    registry: Arc<ToolRegistry>,
    /// Reserved path prefix, without a trailing slash.
    prefix: String,
    /// Maximum accepted request body size in bytes.
    max_body_bytes: usize,
    /// Metrics sink for dispatch outcomes.
    metrics: Arc<dyn DispatchMetrics>,
}

impl Dispatcher {
    /// Creates a dispatcher for the registry using server settings.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, server: &ServerConfig) -> Self {
        Self {
            registry,
            prefix: server.path_prefix.trim().trim_end_matches('/').to_string(),
            max_body_bytes: server.max_body_bytes,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns true when `path` lies under the reserved prefix.
    ///
    /// Matching is per segment and ignores ASCII case: `/mcp` and `/MCP/x`
    /// match, `/mcpx` does not.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let Some(head) = path.get(..self.prefix.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return false;
        }
        path.get(self.prefix.len()..).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Handles one intercepted request end to end.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let cancel = request.extensions().get::<CancellationToken>().cloned().unwrap_or_default();
        let mut span = RequestSpan::new();
        let instrument = span.span().clone();
        let result = self.process(request, &cancel, &mut span).instrument(instrument.clone()).await;
        let result = match result {
            Ok(_) if cancel.is_cancelled() => Err(Halt::Cancelled),
            other => other,
        };
        let (outcome, response) = instrument.in_scope(|| finish(result, &mut span));
        self.metrics.record_dispatch(DispatchEvent {
            tool: span.tool().to_string(),
            correlation_id: span.correlation_id().map(str::to_string),
            outcome,
            status: response.status().as_u16(),
            latency: started.elapsed(),
        });
        response
    }

    /// Reads, resolves, and executes a tool request.
    async fn process(
        &self,
        request: Request,
        cancel: &CancellationToken,
        span: &mut RequestSpan,
    ) -> Result<Answer, Halt> {
        let body = until_cancelled(cancel, read_body(request.into_body(), self.max_body_bytes))
            .await
            .map_err(|_| Halt::Cancelled)??;
        let tool_request = ToolRequest::from_body(&body);
        span.set_tool(&tool_request.tool);
        span.set_correlation_id(tool_request.correlation_id.as_deref());

        let Some(tool) = self.registry.resolve(&tool_request.tool) else {
            tracing::debug!(tool = %tool_request.tool, "no tool registered under requested name");
            return Ok(Answer {
                outcome: DispatchOutcome::NotFound,
                status: StatusCode::NOT_FOUND,
                envelope: ToolResponse::fail_with_code(
                    format!("Tool '{}' not found.", tool_request.tool),
                    ERROR_CODE_TOOL_NOT_FOUND,
                ),
            });
        };

        let log = TracingToolLog::for_request(&tool_request);
        let execution = AssertUnwindSafe(tool.execute(&tool_request, &log, cancel)).catch_unwind();
        let envelope = match until_cancelled(cancel, execution).await {
            Err(_) | Ok(Ok(Err(ToolFault::Cancelled))) => return Err(Halt::Cancelled),
            Ok(Ok(Err(ToolFault::Internal(detail)))) => return Err(Halt::Fault(detail)),
            Ok(Err(panic)) => return Err(Halt::Fault(panic_detail(panic.as_ref()))),
            Ok(Ok(Ok(envelope))) => envelope,
        };
        let (outcome, status) = if envelope.is_success() {
            (DispatchOutcome::Ok, StatusCode::OK)
        } else {
            (DispatchOutcome::ToolFailure, StatusCode::BAD_REQUEST)
        };
        Ok(Answer {
            outcome,
            status,
            envelope,
        })
    }
}

/// Axum middleware entry point.
///
/// Requests outside the reserved prefix are passed to `next` untouched.
pub async fn dispatch_middleware(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request,
    next: Next,
) -> Response {
    if !dispatcher.matches(request.uri().path()) {
        return next.run(request).await;
    }
    dispatcher.dispatch(request).await
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Envelope produced by a completed dispatch.
struct Answer {
    /// Outcome classification.
    outcome: DispatchOutcome,
    /// HTTP status to write.
    status: StatusCode,
    /// Envelope to serialize.
    envelope: ToolResponse,
}

/// Early exits from the dispatch pipeline.
enum Halt {
    /// The request's cancellation token fired.
    Cancelled,
    /// The body exceeded the configured limit.
    TooLarge(usize),
    /// Unclassified fault with its description.
    Fault(String),
}

/// Converts a dispatch result into an HTTP response, updating the span.
fn finish(result: Result<Answer, Halt>, span: &mut RequestSpan) -> (DispatchOutcome, Response) {
    let answer = match result {
        Ok(answer) => answer,
        Err(Halt::Cancelled) => {
            tracing::warn!(
                tool = span.tool(),
                correlation_id = span.correlation_id().unwrap_or_default(),
                "tool request cancelled"
            );
            let status = StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::REQUEST_TIMEOUT);
            return (DispatchOutcome::Cancelled, status.into_response());
        }
        Err(Halt::TooLarge(limit)) => Answer {
            outcome: DispatchOutcome::PayloadTooLarge,
            status: StatusCode::PAYLOAD_TOO_LARGE,
            envelope: ToolResponse::fail_with_code(
                format!("Request body exceeds {limit} bytes."),
                ERROR_CODE_PAYLOAD_TOO_LARGE,
            ),
        },
        Err(Halt::Fault(detail)) => return fault_response(&detail, span),
    };

    let envelope = answer.envelope.with_correlation_id(span.correlation_id().map(str::to_string));
    let body = match serde_json::to_vec(&envelope) {
        Ok(body) => body,
        Err(err) => return fault_response(&format!("response serialization failed: {err}"), span),
    };
    match envelope.error() {
        None => span.set_ok(),
        Some(error) if answer.outcome == DispatchOutcome::ToolFailure => {
            span.set_error(envelope.message().unwrap_or(&error.detail));
        }
        Some(error) => span.set_error(&error.code),
    }
    (answer.outcome, json_response(answer.status, Body::from(body)))
}

/// Logs a fault and builds the generic internal error response.
fn fault_response(detail: &str, span: &mut RequestSpan) -> (DispatchOutcome, Response) {
    tracing::error!(
        tool = span.tool(),
        correlation_id = span.correlation_id().unwrap_or_default(),
        error = detail,
        "tool request faulted"
    );
    span.set_error(detail);
    let envelope = ToolResponse::fail_with_code(INTERNAL_ERROR_MESSAGE, ERROR_CODE_SERVER_ERROR)
        .with_correlation_id(span.correlation_id().map(str::to_string));
    let body = serde_json::to_vec(&envelope)
        .map_or_else(|_| Body::from(FALLBACK_ERROR_BODY), Body::from);
    (DispatchOutcome::Faulted, json_response(StatusCode::INTERNAL_SERVER_ERROR, body))
}

/// Builds a JSON response.
fn json_response(status: StatusCode, body: Body) -> Response {
    let mut response = (status, body).into_response();
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Collects the request body up to `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, Halt> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(Halt::TooLarge(limit)),
        Err(err) => Err(Halt::Fault(format!("request body read failed: {err}"))),
    }
}

/// Extracts a description from a panic payload.
fn panic_detail(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string());
    format!("tool panicked: {message}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
