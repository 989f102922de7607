// crates/tool-relay-tools/src/broker.rs
// ============================================================================
// Module: Broker Status Tool
// Description: `rabbit.status` tool reporting AMQP broker reachability.
// Purpose: Let operators check broker connectivity through the relay.
// Dependencies: tokio, serde_json, tool-relay-core, tool-relay-config
// ============================================================================

//! ## Overview
//! [`BrokerStatusTool`] merges payload overrides onto configured connection
//! defaults, runs the AMQP handshake probe under a connect timeout, and
//! reports `isConnected` along with the server identification. Configured
//! credentials are only sent to the configured endpoint; a payload-chosen
//! host, port, or vhost falls back to the public `guest` account. Connection
//! failures are failure envelopes with code `rabbit_connection_error` and
//! `{ isConnected: false, error }` diagnostics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use tool_relay_config::RabbitMqConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::ERROR_CODE_INVALID_PAYLOAD;
use tool_relay_core::Tool;
use tool_relay_core::ToolFault;
use tool_relay_core::ToolLog;
use tool_relay_core::ToolRequest;
use tool_relay_core::ToolResponse;
use tool_relay_core::until_cancelled;

use crate::amqp;
use crate::amqp::ProbeTarget;
use crate::amqp::ServerInfo;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry name of the broker status tool.
pub const BROKER_STATUS_TOOL: &str = "rabbit.status";
/// Error code for failed broker connections.
pub const ERROR_CODE_RABBIT_CONNECTION: &str = "rabbit_connection_error";
/// Placeholder for server properties the broker did not report.
const UNKNOWN_PROPERTY: &str = "unknown";
/// Public broker account used for endpoints outside the configuration.
const GUEST_CREDENTIAL: &str = "guest";

// ============================================================================
// SECTION: Tool
// ============================================================================

/// `rabbit.status` tool.
#[derive(Debug, Clone)]
pub struct BrokerStatusTool {
    /// Connection defaults used when the payload omits a field.
    defaults: RabbitMqConfig,
}

impl BrokerStatusTool {
    /// Builds the tool from broker configuration.
    #[must_use]
    pub const fn new(defaults: RabbitMqConfig) -> Self {
        Self {
            defaults,
        }
    }

    /// Resolves the probe target from payload overrides.
    fn target(&self, request: &ToolRequest) -> Result<ProbeTarget, String> {
        let host = string_field(request, "host", &self.defaults.host)?;
        let port = port_field(request, self.defaults.port)?;
        let vhost = string_field(request, "vhost", &self.defaults.vhost)?;
        let (default_user, default_password) = if self.is_configured_endpoint(&host, port, &vhost) {
            (self.defaults.user.as_str(), self.defaults.password.as_str())
        } else {
            (GUEST_CREDENTIAL, GUEST_CREDENTIAL)
        };
        Ok(ProbeTarget {
            user: string_field(request, "user", default_user)?,
            password: string_field(request, "password", default_password)?,
            host,
            port,
            vhost,
        })
    }

    /// Returns true when the resolved endpoint is the configured broker.
    fn is_configured_endpoint(&self, host: &str, port: u16, vhost: &str) -> bool {
        host.eq_ignore_ascii_case(&self.defaults.host)
            && port == self.defaults.port
            && vhost == self.defaults.vhost
    }
}

#[async_trait]
impl Tool for BrokerStatusTool {
    fn name(&self) -> &str {
        BROKER_STATUS_TOOL
    }

    fn description(&self) -> &str {
        "Checks basic connectivity with the RabbitMQ broker."
    }

    async fn execute(
        &self,
        request: &ToolRequest,
        log: &dyn ToolLog,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        let target = match self.target(request) {
            Ok(target) => target,
            Err(reason) => {
                return Ok(ToolResponse::fail_with_code(reason, ERROR_CODE_INVALID_PAYLOAD));
            }
        };
        log.info(&format!(
            "probing broker {}:{} vhost {}",
            target.host, target.port, target.vhost
        ));
        let timeout = self.defaults.connect_timeout();
        let outcome = until_cancelled(cancel, probe_with_timeout(&target, timeout)).await?;
        match outcome {
            Ok(info) => {
                log.info("broker connection established");
                Ok(connected_response(&target, info))
            }
            Err(reason) => {
                log.warn(&format!("broker connection failed: {reason}"));
                Ok(failed_response(&reason))
            }
        }
    }
}

/// Runs the probe, bounding the whole handshake by `timeout`.
async fn probe_with_timeout(target: &ProbeTarget, timeout: Duration) -> Result<ServerInfo, String> {
    match tokio::time::timeout(timeout, amqp::probe(target)).await {
        Ok(result) => result.map_err(|err| err.to_string()),
        Err(_) => Err(format!("connection timed out after {} ms", timeout.as_millis())),
    }
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Builds the success envelope.
fn connected_response(target: &ProbeTarget, info: ServerInfo) -> ToolResponse {
    let mut data = Map::new();
    data.insert("isConnected".to_string(), Value::Bool(true));
    let unknown = || UNKNOWN_PROPERTY.to_string();
    data.insert("product".to_string(), Value::String(info.product.unwrap_or_else(unknown)));
    data.insert("version".to_string(), Value::String(info.version.unwrap_or_else(unknown)));
    data.insert("host".to_string(), Value::String(target.host.clone()));
    data.insert("vhost".to_string(), Value::String(target.vhost.clone()));
    ToolResponse::ok(data).with_message("Connected to broker.")
}

/// Builds the failure envelope with diagnostics.
fn failed_response(reason: &str) -> ToolResponse {
    let mut data = Map::new();
    data.insert("isConnected".to_string(), Value::Bool(false));
    data.insert("error".to_string(), Value::String(reason.to_string()));
    ToolResponse::fail_with_code("Could not connect to the broker.", ERROR_CODE_RABBIT_CONNECTION)
        .with_data(data)
}

// ============================================================================
// SECTION: Payload Fields
// ============================================================================

/// Reads an optional string override.
fn string_field(request: &ToolRequest, key: &str, default: &str) -> Result<String, String> {
    match request.payload.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Ok(default.to_string()),
        Some(_) => Err(format!("Payload field '{key}' must be a string.")),
    }
}

/// Reads an optional port override given as a number or numeric string.
fn port_field(request: &ToolRequest, default: u16) -> Result<u16, String> {
    let invalid = || "Payload field 'port' must be a port number between 1 and 65535.".to_string();
    let port = match request.payload.get("port") {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(number)) => {
            number.as_u64().and_then(|port| u16::try_from(port).ok()).ok_or_else(invalid)?
        }
        Some(Value::String(text)) => text.trim().parse::<u16>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    if port == 0 {
        return Err(invalid());
    }
    Ok(port)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
