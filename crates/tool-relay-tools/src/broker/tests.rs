// crates/tool-relay-tools/src/broker/tests.rs
// ============================================================================
// Module: Broker Status Tool Unit Tests
// Description: Unit tests for payload overrides and connection outcomes.
// Purpose: Validate `rabbit.status` envelopes against a scripted broker.
// Dependencies: tokio, tool-relay-core
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions."
)]

use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tool_relay_config::RabbitMqConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::ERROR_CODE_INVALID_PAYLOAD;
use tool_relay_core::Tool;
use tool_relay_core::ToolFault;
use tool_relay_core::ToolRequest;
use tool_relay_core::ToolResponse;
use tool_relay_core::TracingToolLog;

use super::BrokerStatusTool;
use super::ERROR_CODE_RABBIT_CONNECTION;
use crate::amqp::fake_broker;
use crate::amqp::fake_broker::Script;

fn defaults(port: u16) -> RabbitMqConfig {
    RabbitMqConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout_ms: 500,
        ..RabbitMqConfig::default()
    }
}

fn request(payload: Value) -> ToolRequest {
    let Value::Object(payload) = payload else {
        panic!("payload must be an object");
    };
    ToolRequest::new("rabbit.status", payload)
}

async fn run(tool: &BrokerStatusTool, request: &ToolRequest) -> Result<ToolResponse, ToolFault> {
    let log = TracingToolLog::for_request(request);
    tool.execute(request, &log, &CancellationToken::new()).await
}

#[tokio::test]
async fn connected_broker_reports_server_identity() {
    let broker = fake_broker::spawn(Script::Accept).await;
    let tool = BrokerStatusTool::new(defaults(broker.addr.port()));

    let response = run(&tool, &request(json!({}))).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.message(), Some("Connected to broker."));
    assert_eq!(
        Value::Object(response.data().clone()),
        json!({
            "isConnected": true,
            "product": "RabbitMQ",
            "version": "3.13.7",
            "host": "127.0.0.1",
            "vhost": "/",
        })
    );
    assert_eq!(broker.seen().credentials, b"\0guest\0guest");
}

#[tokio::test]
async fn payload_overrides_defaults() {
    let broker = fake_broker::spawn(Script::Accept).await;
    let tool = BrokerStatusTool::new(defaults(1));
    let payload = json!({
        "port": broker.addr.port().to_string(),
        "user": "ops",
        "password": "pw",
        "vhost": "orders",
    });

    let response = run(&tool, &request(payload)).await.unwrap();

    assert!(response.is_success());
    let seen = broker.seen();
    assert_eq!(seen.credentials, b"\0ops\0pw");
    assert_eq!(seen.vhost.as_deref(), Some("orders"));
}

fn secret_defaults(port: u16) -> RabbitMqConfig {
    RabbitMqConfig {
        user: "svc".to_string(),
        password: "s3cret".to_string(),
        ..defaults(port)
    }
}

#[tokio::test]
async fn configured_credentials_reach_configured_endpoint() {
    let broker = fake_broker::spawn(Script::Accept).await;
    let tool = BrokerStatusTool::new(secret_defaults(broker.addr.port()));
    let payload = json!({ "host": "127.0.0.1", "port": broker.addr.port() });

    let response = run(&tool, &request(payload)).await.unwrap();

    assert!(response.is_success());
    assert_eq!(broker.seen().credentials, b"\0svc\0s3cret");
}

#[tokio::test]
async fn configured_password_never_reaches_payload_host() {
    let broker = fake_broker::spawn(Script::Accept).await;
    let tool = BrokerStatusTool::new(secret_defaults(1));
    let payload = json!({ "host": "127.0.0.1", "port": broker.addr.port() });

    let response = run(&tool, &request(payload)).await.unwrap();

    assert!(response.is_success());
    let seen = broker.seen();
    assert_eq!(seen.credentials, b"\0guest\0guest");
    assert!(!String::from_utf8_lossy(&seen.credentials).contains("s3cret"));
}

#[tokio::test]
async fn payload_vhost_drops_configured_credentials() {
    let broker = fake_broker::spawn(Script::Accept).await;
    let tool = BrokerStatusTool::new(secret_defaults(broker.addr.port()));

    let response = run(&tool, &request(json!({ "vhost": "other" }))).await.unwrap();

    assert!(response.is_success());
    assert_eq!(broker.seen().credentials, b"\0guest\0guest");
}

#[tokio::test]
async fn refused_login_is_connection_failure() {
    let broker = fake_broker::spawn(Script::RefuseLogin).await;
    let tool = BrokerStatusTool::new(defaults(broker.addr.port()));

    let response = run(&tool, &request(json!({}))).await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.message(), Some("Could not connect to the broker."));
    assert_eq!(response.error().unwrap().code, ERROR_CODE_RABBIT_CONNECTION);
    assert_eq!(response.data().get("isConnected"), Some(&Value::Bool(false)));
    let detail = response.data().get("error").and_then(Value::as_str).unwrap();
    assert!(detail.contains("403"), "detail: {detail}");
}

#[tokio::test]
async fn closed_port_is_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let tool = BrokerStatusTool::new(defaults(port));

    let response = run(&tool, &request(json!({}))).await.unwrap();

    assert_eq!(response.error().unwrap().code, ERROR_CODE_RABBIT_CONNECTION);
}

#[tokio::test]
async fn silent_broker_times_out() {
    let broker = fake_broker::spawn(Script::Stall).await;
    let tool = BrokerStatusTool::new(defaults(broker.addr.port()));

    let response = run(&tool, &request(json!({}))).await.unwrap();

    assert_eq!(response.error().unwrap().code, ERROR_CODE_RABBIT_CONNECTION);
    let detail = response.data().get("error").and_then(Value::as_str).unwrap();
    assert_eq!(detail, "connection timed out after 500 ms");
}

#[tokio::test]
async fn cancellation_escapes_as_fault() {
    let broker = fake_broker::spawn(Script::Stall).await;
    let tool = BrokerStatusTool::new(defaults(broker.addr.port()));
    let request = request(json!({}));
    let log = TracingToolLog::for_request(&request);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = tool.execute(&request, &log, &cancel).await;

    assert_eq!(outcome, Err(ToolFault::Cancelled));
}

#[tokio::test]
async fn bad_port_is_invalid_payload() {
    let tool = BrokerStatusTool::new(defaults(5672));
    for port in [json!(0), json!(70_000), json!("amqp"), json!(true)] {
        let response = run(&tool, &request(json!({ "port": port }))).await.unwrap();
        assert_eq!(response.error().unwrap().code, ERROR_CODE_INVALID_PAYLOAD);
    }
}

#[tokio::test]
async fn non_string_host_is_invalid_payload() {
    let tool = BrokerStatusTool::new(defaults(5672));
    let response = run(&tool, &request(json!({ "host": ["a", "b"] }))).await.unwrap();
    assert_eq!(response.message(), Some("Payload field 'host' must be a string."));
}
