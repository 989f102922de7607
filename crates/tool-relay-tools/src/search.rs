// crates/tool-relay-tools/src/search.rs
// ============================================================================
// Module: Log Search Tool
// Description: `logs.search` tool backed by an OpenSearch-compatible engine.
// Purpose: Run query-string searches over the application log indices.
// Dependencies: reqwest, serde_json, tool-relay-core, tool-relay-config
// ============================================================================

//! ## Overview
//! [`LogSearchTool`] posts a `query_string` query to the configured
//! `_search` endpoint and returns `{ total, hits }`, where `hits` holds the
//! `_source` of each matching document. Upstream failures of any kind become
//! an `opensearch_error` failure envelope; only cancellation escapes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tool_relay_config::OpenSearchConfig;
use tool_relay_core::CancellationToken;
use tool_relay_core::ERROR_CODE_INVALID_PAYLOAD;
use tool_relay_core::Tool;
use tool_relay_core::ToolFault;
use tool_relay_core::ToolLog;
use tool_relay_core::ToolRequest;
use tool_relay_core::ToolResponse;
use tool_relay_core::until_cancelled;

use crate::ToolInitError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry name of the log search tool.
pub const LOG_SEARCH_TOOL: &str = "logs.search";
/// Error code for failed searches.
pub const ERROR_CODE_OPENSEARCH: &str = "opensearch_error";
/// Query used when the payload omits `query`.
const DEFAULT_QUERY: &str = "*";
/// Failure message returned to callers.
const SEARCH_FAILED_MESSAGE: &str = "Failed to query OpenSearch.";
/// Reason recorded when an error body carries nothing usable.
const UNKNOWN_REASON: &str = "unknown error";
/// Upper bound on raw error text kept from a non-JSON error body.
const MAX_REASON_CHARS: usize = 256;

// ============================================================================
// SECTION: Tool
// ============================================================================

/// `logs.search` tool.
#[derive(Debug, Clone)]
pub struct LogSearchTool {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Fully qualified `_search` endpoint.
    search_url: String,
    /// Maximum number of hits requested.
    max_hits: u32,
}

impl LogSearchTool {
    /// Builds the tool from search backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolInitError::HttpClient`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &OpenSearchConfig) -> Result<Self, ToolInitError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| ToolInitError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            search_url: config.search_url(),
            max_hits: config.max_hits,
        })
    }

    /// Runs a search and decodes the result.
    async fn search(&self, query: &str) -> Result<SearchResult, SearchError> {
        let body = json!({
            "query": { "query_string": { "query": query } },
            "size": self.max_hits,
        });
        let response = self
            .client
            .post(&self.search_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| SearchError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(SearchError::Upstream {
                status: status.as_u16(),
                reason: upstream_reason(&bytes),
            });
        }
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|err| SearchError::Decode(err.to_string()))?;
        parse_search_response(&payload)
    }
}

#[async_trait]
impl Tool for LogSearchTool {
    fn name(&self) -> &str {
        LOG_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Searches application logs in the OpenSearch index pattern."
    }

    async fn execute(
        &self,
        request: &ToolRequest,
        log: &dyn ToolLog,
        cancel: &CancellationToken,
    ) -> Result<ToolResponse, ToolFault> {
        let query = match request.payload.get("query") {
            None | Some(Value::Null) => DEFAULT_QUERY,
            Some(Value::String(query)) => query.as_str(),
            Some(_) => {
                return Ok(ToolResponse::fail_with_code(
                    "Payload field 'query' must be a string.",
                    ERROR_CODE_INVALID_PAYLOAD,
                ));
            }
        };
        log.info(&format!("running log search with query: {query}"));
        match until_cancelled(cancel, self.search(query)).await? {
            Ok(result) => {
                log.debug(&format!("log search matched {} documents", result.total));
                Ok(ToolResponse::ok(result.into_data()))
            }
            Err(err) => {
                log.error(&format!("log search failed: {err}"));
                Ok(ToolResponse::fail_with_code(SEARCH_FAILED_MESSAGE, ERROR_CODE_OPENSEARCH))
            }
        }
    }
}

// ============================================================================
// SECTION: Response Decoding
// ============================================================================

/// Decoded search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Total number of matching documents.
    pub total: u64,
    /// `_source` documents of the returned hits.
    pub hits: Vec<Value>,
}

impl SearchResult {
    /// Converts the result into the envelope data object.
    #[must_use]
    pub fn into_data(self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("total".to_string(), Value::from(self.total));
        data.insert("hits".to_string(), Value::Array(self.hits));
        data
    }
}

/// Decodes a `_search` response body.
///
/// `hits.total` may be an object with a `value` field or a bare number.
///
/// # Errors
///
/// Returns [`SearchError::Decode`] when the body lacks a hits section.
pub fn parse_search_response(payload: &Value) -> Result<SearchResult, SearchError> {
    let hits = payload
        .get("hits")
        .ok_or_else(|| SearchError::Decode("response has no hits section".to_string()))?;
    let total = hits
        .get("total")
        .and_then(|total| total.get("value").and_then(Value::as_u64).or_else(|| total.as_u64()))
        .ok_or_else(|| SearchError::Decode("response has no hits.total".to_string()))?;
    let documents = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| entry.get("_source").cloned().unwrap_or(Value::Null))
                .collect()
        })
        .unwrap_or_default();
    Ok(SearchResult {
        total,
        hits: documents,
    })
}

/// Describes a non-success response body.
///
/// JSON bodies yield their `error.reason`; anything else (such as a proxy's
/// HTML error page) is reported as bounded raw text.
fn upstream_reason(body: &[u8]) -> String {
    if let Ok(payload) = serde_json::from_slice::<Value>(body) {
        return error_reason(&payload);
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return UNKNOWN_REASON.to_string();
    }
    text.chars().take(MAX_REASON_CHARS).collect()
}

/// Extracts the upstream error reason from an error body.
fn error_reason(payload: &Value) -> String {
    let error = payload.get("error");
    error
        .and_then(|error| error.get("reason"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str))
        .unwrap_or(UNKNOWN_REASON)
        .to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Search failures, reported to callers as `opensearch_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The engine answered with a non-success status.
    #[error("upstream status {status}: {reason}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Upstream error reason.
        reason: String,
    },
    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
