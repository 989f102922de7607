// crates/tool-relay-mcp/src/server.rs
// ============================================================================
// Module: Relay Server
// Description: HTTP hosting pipeline for the tool dispatcher.
// Purpose: Assemble the axum router and serve it over TCP.
// Dependencies: axum, tokio, tokio-util, tool-relay-core, tool-relay-config
// ============================================================================

//! ## Overview
//! [`McpServer`] owns the validated configuration and the shared tool
//! registry. The router it builds layers, from the outside in:
//! 1. the request-deadline layer, which installs a per-request
//!    [`CancellationToken`] that fires on deadline or when the request future
//!    is dropped;
//! 2. the dispatcher middleware, which claims the reserved prefix;
//! 3. `/healthz` and a 404 fallback for everything else.
//!
//! Security posture: request bodies are untrusted; size limits and deadlines
//! are enforced before any tool runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tool_relay_config::RelayConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::ToolRegistry;

use crate::dispatcher::Dispatcher;
use crate::dispatcher::dispatch_middleware;
use crate::telemetry::DispatchMetrics;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Tool relay HTTP server.
pub struct McpServer {
    /// Validated configuration.
    config: RelayConfig,
    /// Shared tool registry.
    registry: Arc<ToolRegistry>,
    /// Dispatch metrics sink.
    metrics: Arc<dyn DispatchMetrics>,
}

impl McpServer {
    /// Creates a server from configuration and a populated registry.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Config`] when the configuration is invalid.
    pub fn new(config: RelayConfig, registry: Arc<ToolRegistry>) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        Ok(Self {
            config,
            registry,
            metrics: Arc::new(NoopMetrics),
        })
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Builds the fully layered router.
    #[must_use]
    pub fn router(&self) -> Router {
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&self.registry), &self.config.server)
                .with_metrics(Arc::clone(&self.metrics)),
        );
        Router::new()
            .route("/healthz", get(healthz))
            .fallback(not_found)
            .with_state(Arc::clone(&self.registry))
            .layer(middleware::from_fn_with_state(dispatcher, dispatch_middleware))
            .layer(middleware::from_fn_with_state(
                self.config.server.request_timeout(),
                request_deadline,
            ))
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let addr: SocketAddr =
            self.config.server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| McpServerError::Transport(format!("bind {addr} failed: {err}")))?;
        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Transport`] when the server fails.
    pub async fn serve_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), McpServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().map_err(|err| McpServerError::Transport(err.to_string()))?;
        let tools: Vec<String> = self.registry.list().into_iter().map(|tool| tool.name).collect();
        tracing::info!(
            bind = %local,
            prefix = %self.config.server.path_prefix,
            tools = %tools.join(","),
            "tool relay listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")))?;
        tracing::info!("tool relay stopped");
        Ok(())
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness probe reporting the registered tool count.
async fn healthz(State(registry): State<Arc<ToolRegistry>>) -> Json<Value> {
    Json(json!({ "status": "ok", "tools": registry.len() }))
}

/// Fallback for unrouted paths.
async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Installs the request cancellation token and enforces the deadline.
///
/// The token is cancelled when the deadline elapses and when this layer
/// completes or is dropped.
async fn request_deadline(
    State(deadline): State<Option<Duration>>,
    mut request: Request,
    next: Next,
) -> Response {
    let cancel = CancellationToken::new();
    request.extensions_mut().insert(cancel.clone());
    let _guard = cancel.clone().drop_guard();
    match deadline {
        None => next.run(request).await,
        Some(deadline) => {
            let run = next.run(request);
            tokio::pin!(run);
            tokio::select! {
                response = &mut run => response,
                () = tokio::time::sleep(deadline) => {
                    tracing::debug!(deadline_ms = %deadline.as_millis(), "request deadline elapsed");
                    cancel.cancel();
                    run.await
                }
            }
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
