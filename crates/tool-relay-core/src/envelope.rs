// crates/tool-relay-core/src/envelope.rs
// ============================================================================
// Module: Tool Envelopes
// Description: Request and response envelopes for tool invocations.
// Purpose: Provide the stable JSON contract exchanged at the HTTP boundary.
// Dependencies: serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! A [`ToolRequest`] names a tool, carries an opaque JSON object payload, and
//! optionally a caller-supplied correlation identifier. A [`ToolResponse`] is
//! the normalized success/failure envelope returned to the caller.
//!
//! ## Invariants
//! - `success == true` implies `error == None`.
//! - `success == false` implies `error == Some(_)`.
//! - `data` is always an object and defaults to `{}`.
//!
//! Request parsing never fails: an empty or malformed body degrades to
//! [`ToolRequest::default`], which no registry entry resolves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Default error code for tool failures without a specific code.
pub const ERROR_CODE_DEFAULT: &str = "error";
/// Error code when the requested tool is not registered.
pub const ERROR_CODE_TOOL_NOT_FOUND: &str = "tool_not_found";
/// Error code for unclassified faults inside the dispatcher or a tool.
pub const ERROR_CODE_SERVER_ERROR: &str = "server_error";
/// Error code when the request body exceeds the configured limit.
pub const ERROR_CODE_PAYLOAD_TOO_LARGE: &str = "payload_too_large";
/// Error code for payload fields a tool cannot interpret.
pub const ERROR_CODE_INVALID_PAYLOAD: &str = "invalid_payload";

// ============================================================================
// SECTION: Request Envelope
// ============================================================================

/// Inbound tool invocation envelope.
///
/// # Invariants
/// - `payload` is always a JSON object; `null` or absent payloads are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// Registry lookup key.
    #[serde(default, alias = "Tool", deserialize_with = "null_as_default")]
    pub tool: String,
    /// Opaque payload passed verbatim to the resolved tool.
    #[serde(default, alias = "Payload", deserialize_with = "null_as_default")]
    pub payload: Map<String, Value>,
    /// Caller-supplied correlation identifier, echoed back unchanged.
    #[serde(default, alias = "CorrelationId")]
    pub correlation_id: Option<String>,
}

impl ToolRequest {
    /// Creates a request for the named tool with the given payload.
    #[must_use]
    pub fn new(tool: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            payload,
            correlation_id: None,
        }
    }

    /// Sets the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Parses a request from a raw HTTP body.
    ///
    /// Empty or malformed bodies yield [`ToolRequest::default`].
    #[must_use]
    pub fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "unparsable tool request body; using empty envelope");
                Self::default()
            }
        }
    }

    /// Returns the payload value for `key` when it is a string.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

// ============================================================================
// SECTION: Response Envelope
// ============================================================================

/// Machine-readable error details attached to failure envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Short taxonomy tag (for example `tool_not_found`).
    #[serde(alias = "Code")]
    pub code: String,
    /// Human-readable explanation.
    #[serde(default, alias = "Detail")]
    pub detail: String,
}

impl ErrorInfo {
    /// Creates error details from a code and detail message.
    #[must_use]
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

/// Normalized tool response envelope.
///
/// # Invariants
/// - Exactly one of "success" or "carries an error" holds; constructors and
///   deserialization both enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawToolResponse")]
pub struct ToolResponse {
    /// Whether the tool succeeded.
    success: bool,
    /// Optional human-readable message.
    message: Option<String>,
    /// Error details, present only on failure.
    error: Option<ErrorInfo>,
    /// Result or diagnostic data.
    data: Map<String, Value>,
    /// Correlation identifier mirrored from the request.
    correlation_id: Option<String>,
}

impl ToolResponse {
    /// Builds a success envelope carrying `data`.
    #[must_use]
    pub const fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            data,
            correlation_id: None,
        }
    }

    /// Builds a failure envelope with the default error code.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::fail_with_code(message, ERROR_CODE_DEFAULT)
    }

    /// Builds a failure envelope with an explicit error code.
    #[must_use]
    pub fn fail_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(ErrorInfo::new(code, message.clone())),
            message: Some(message),
            data: Map::new(),
            correlation_id: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replaces the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Replaces the data object (success payload or failure diagnostics).
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Returns true for success envelopes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error details of a failure envelope.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Returns the data object.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns the correlation identifier, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

/// Wire shape of a response prior to invariant checks.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolResponse {
    /// Success flag.
    #[serde(alias = "Success")]
    success: bool,
    /// Optional message.
    #[serde(default, alias = "Message")]
    message: Option<String>,
    /// Optional error details.
    #[serde(default, alias = "Error")]
    error: Option<ErrorInfo>,
    /// Data object.
    #[serde(default, alias = "Data", deserialize_with = "null_as_default")]
    data: Map<String, Value>,
    /// Correlation identifier.
    #[serde(default, alias = "CorrelationId")]
    correlation_id: Option<String>,
}

impl TryFrom<RawToolResponse> for ToolResponse {
    type Error = EnvelopeError;

    fn try_from(raw: RawToolResponse) -> Result<Self, Self::Error> {
        match (raw.success, raw.error.is_some()) {
            (true, true) => return Err(EnvelopeError::ErrorOnSuccess),
            (false, false) => return Err(EnvelopeError::MissingError),
            _ => {}
        }
        Ok(Self {
            success: raw.success,
            message: raw.message,
            error: raw.error,
            data: raw.data,
            correlation_id: raw.correlation_id,
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope invariant violations detected while decoding a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// A success envelope carried error details.
    #[error("success envelope must not carry an error")]
    ErrorOnSuccess,
    /// A failure envelope had no error details.
    #[error("failure envelope must carry an error")]
    MissingError,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Deserializes `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
