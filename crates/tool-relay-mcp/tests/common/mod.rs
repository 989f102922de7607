// crates/tool-relay-mcp/tests/common/mod.rs
// ============================================================================
// Module: Dispatcher Test Helpers
// Description: Shared tools, metrics, and request helpers.
// Purpose: Keep dispatcher integration tests focused on behavior.
// Dependencies: tool-relay-mcp, tool-relay-core, axum, tower
// ============================================================================

//! Shared helpers for dispatcher integration tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared helpers; not every test file uses every helper."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::Notify;
use tool_relay_config::RelayConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::Tool;
use tool_relay_core::ToolFault;
use tool_relay_core::ToolLog;
use tool_relay_core::ToolRegistry;
use tool_relay_core::ToolRequest;
use tool_relay_core::ToolResponse;
use tool_relay_mcp::DispatchEvent;
use tool_relay_mcp::DispatchMetrics;
use tool_relay_mcp::McpServer;
use tower::ServiceExt;

// ============================================================================
// SECTION: Tools
// ============================================================================

/// Tool returning a fixed envelope and counting invocations.
pub struct StaticTool {
    pub name: &'static str,
    pub response: ToolResponse,
    pub calls: AtomicUsize,
}

impl StaticTool {
    pub fn shared(name: &'static str, response: ToolResponse) -> Arc<Self> {
        Arc::new(Self {
            name,
            response,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed envelope."
    }

    async fn execute(
        &self,
        _request: &ToolRequest,
        log: &dyn ToolLog,
        _cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        log.info("static tool invoked");
        Ok(self.response.clone())
    }
}

/// Tool that faults with a secret-bearing message.
pub struct FaultingTool;

#[async_trait]
impl Tool for FaultingTool {
    fn name(&self) -> &str {
        "faulty"
    }

    fn description(&self) -> &str {
        "Always faults."
    }

    async fn execute(
        &self,
        _request: &ToolRequest,
        _log: &dyn ToolLog,
        _cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        Err(ToolFault::internal("connection string password=hunter2 rejected"))
    }
}

/// Tool that panics.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicky"
    }

    fn description(&self) -> &str {
        "Always panics."
    }

    async fn execute(
        &self,
        _request: &ToolRequest,
        _log: &dyn ToolLog,
        _cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        panic!("internal invariant hunter2 broken");
    }
}

/// Tool that signals once started and then waits for cancellation.
pub struct BlockingTool {
    pub started: Notify,
}

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &str {
        "blocking"
    }

    fn description(&self) -> &str {
        "Blocks until cancelled."
    }

    async fn execute(
        &self,
        _request: &ToolRequest,
        _log: &dyn ToolLog,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        self.started.notify_one();
        cancel.cancelled().await;
        Err(ToolFault::Cancelled)
    }
}

/// Tool that echoes its payload and correlation id.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes the payload."
    }

    async fn execute(
        &self,
        request: &ToolRequest,
        _log: &dyn ToolLog,
        _cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        Ok(ToolResponse::ok(request.payload.clone()))
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Metrics sink capturing every event.
#[derive(Default)]
pub struct TestMetrics {
    pub events: Mutex<Vec<DispatchEvent>>,
}

impl TestMetrics {
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl DispatchMetrics for TestMetrics {
    fn record_dispatch(&self, event: DispatchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// SECTION: Router Helpers
// ============================================================================

/// Builds a router over `tools` with default configuration.
pub fn router(tools: Vec<Arc<dyn Tool>>) -> (Router, Arc<TestMetrics>) {
    router_with_config(tools, RelayConfig::default())
}

/// Builds a router over `tools` with the given configuration.
pub fn router_with_config(
    tools: Vec<Arc<dyn Tool>>,
    config: RelayConfig,
) -> (Router, Arc<TestMetrics>) {
    let registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    let metrics = Arc::new(TestMetrics::default());
    let server = McpServer::new(config, Arc::new(registry))
        .unwrap()
        .with_metrics(Arc::clone(&metrics) as Arc<dyn DispatchMetrics>);
    (server.router(), metrics)
}

/// Captured response parts.
pub struct Captured {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Sends `body` to `path` with `method` and captures the response.
pub async fn send(router: Router, method: &str, path: &str, body: impl Into<Body>) -> Captured {
    let request = Request::builder().method(method).uri(path).body(body.into()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    Captured {
        status,
        headers,
        body,
    }
}

/// Posts `body` to `/mcp`.
pub async fn post_mcp(router: Router, body: impl Into<Body>) -> Captured {
    send(router, "POST", "/mcp", body).await
}

/// Builds a JSON object from `value`.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}
