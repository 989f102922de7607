// crates/tool-relay-config/src/config.rs
// ============================================================================
// Module: Tool Relay Configuration
// Description: Configuration loading and validation for the relay server.
// Purpose: Provide strict, fail-closed config parsing with sane defaults.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with a hard size limit. When no
//! path is supplied and neither the environment variable nor the default file
//! is present, built-in defaults apply. Every section validates on load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename looked up in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "tool-relay.toml";
/// Environment variable that points at a configuration file.
pub const CONFIG_ENV_VAR: &str = "TOOL_RELAY_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Default HTTP bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default path prefix routed to the dispatcher.
const DEFAULT_PATH_PREFIX: &str = "/mcp";
/// Default maximum request body size in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default log filter directive.
const DEFAULT_LOG_LEVEL: &str = "info";
/// Default search engine endpoint.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
/// Default search index pattern.
const DEFAULT_OPENSEARCH_INDEX: &str = "projetofila-*";
/// Default maximum number of search hits returned.
const DEFAULT_OPENSEARCH_MAX_HITS: u32 = 50;
/// Upper bound on search hits per request.
const MAX_OPENSEARCH_MAX_HITS: u32 = 10_000;
/// Default search request timeout in milliseconds.
const DEFAULT_OPENSEARCH_TIMEOUT_MS: u64 = 10_000;
/// Default broker host.
const DEFAULT_RABBITMQ_HOST: &str = "localhost";
/// Default broker AMQP port.
const DEFAULT_RABBITMQ_PORT: u16 = 5672;
/// Default broker credential used for both user and password.
const DEFAULT_RABBITMQ_CREDENTIAL: &str = "guest";
/// Default broker virtual host.
const DEFAULT_RABBITMQ_VHOST: &str = "/";
/// Default broker connection timeout in milliseconds.
const DEFAULT_RABBITMQ_CONNECT_TIMEOUT_MS: u64 = 3_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Tool relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Log search backend configuration.
    #[serde(default)]
    pub opensearch: OpenSearchConfig,
    /// Message broker probe defaults.
    #[serde(default)]
    pub rabbitmq: RabbitMqConfig,
}

impl RelayConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// [`DEFAULT_CONFIG_NAME`] when it exists, then built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(resolved) = resolve_path(path) else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.opensearch.validate()?;
        self.rabbitmq.validate()?;
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path prefix intercepted by the tool dispatcher.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Optional per-request deadline in milliseconds.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path_prefix: default_path_prefix(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Returns the request deadline, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        validate_path_prefix(&self.path_prefix)?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "server.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (for example `info` or `info,tool_relay_mcp=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Log search backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSearchConfig {
    /// Base URL of the search engine.
    #[serde(default = "default_opensearch_url")]
    pub url: String,
    /// Index or index pattern searched by `logs.search`.
    #[serde(default = "default_opensearch_index")]
    pub index: String,
    /// Maximum hits returned per query.
    #[serde(default = "default_opensearch_max_hits")]
    pub max_hits: u32,
    /// Request timeout in milliseconds.
    #[serde(default = "default_opensearch_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: default_opensearch_url(),
            index: default_opensearch_index(),
            max_hits: default_opensearch_max_hits(),
            request_timeout_ms: default_opensearch_timeout_ms(),
        }
    }
}

impl OpenSearchConfig {
    /// Returns the `_search` endpoint for the configured index.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}/{}/_search", self.url.trim().trim_end_matches('/'), self.index.trim())
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates search backend configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(
                "opensearch.url must include http:// or https://".to_string(),
            ));
        }
        let index = self.index.trim();
        if index.is_empty() || index.contains('/') || index.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "opensearch.index must be a non-empty index pattern".to_string(),
            ));
        }
        if self.max_hits == 0 || self.max_hits > MAX_OPENSEARCH_MAX_HITS {
            return Err(ConfigError::Invalid(format!(
                "opensearch.max_hits must be between 1 and {MAX_OPENSEARCH_MAX_HITS}"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "opensearch.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Message broker connectivity defaults for `rabbit.status`.
#[derive(Clone, Deserialize)]
pub struct RabbitMqConfig {
    /// Broker host name.
    #[serde(default = "default_rabbitmq_host")]
    pub host: String,
    /// Broker AMQP port.
    #[serde(default = "default_rabbitmq_port")]
    pub port: u16,
    /// Login user.
    #[serde(default = "default_rabbitmq_credential")]
    pub user: String,
    /// Login password.
    #[serde(default = "default_rabbitmq_credential")]
    pub password: String,
    /// Virtual host opened during the probe.
    #[serde(default = "default_rabbitmq_vhost")]
    pub vhost: String,
    /// Connection timeout in milliseconds.
    #[serde(default = "default_rabbitmq_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            host: default_rabbitmq_host(),
            port: default_rabbitmq_port(),
            user: default_rabbitmq_credential(),
            password: default_rabbitmq_credential(),
            vhost: default_rabbitmq_vhost(),
            connect_timeout_ms: default_rabbitmq_connect_timeout_ms(),
        }
    }
}

impl fmt::Debug for RabbitMqConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMqConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl RabbitMqConfig {
    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validates broker defaults.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("rabbitmq.host must be non-empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("rabbitmq.port must be greater than zero".to_string()));
        }
        if self.vhost.is_empty() {
            return Err(ConfigError::Invalid("rabbitmq.vhost must be non-empty".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rabbitmq.connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the CLI, environment, or working directory.
fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR)
        && !env_path.trim().is_empty()
    {
        return Some(PathBuf::from(env_path));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
    default_path.is_file().then_some(default_path)
}

/// Validates the dispatcher path prefix.
fn validate_path_prefix(prefix: &str) -> Result<(), ConfigError> {
    if !prefix.starts_with('/') || prefix.len() < 2 {
        return Err(ConfigError::Invalid(
            "server.path_prefix must start with '/' and name a segment".to_string(),
        ));
    }
    if prefix.ends_with('/') {
        return Err(ConfigError::Invalid(
            "server.path_prefix must not end with '/'".to_string(),
        ));
    }
    if prefix.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(ConfigError::Invalid(
            "server.path_prefix must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default dispatcher path prefix.
fn default_path_prefix() -> String {
    DEFAULT_PATH_PREFIX.to_string()
}

/// Default maximum body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default log filter.
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Default search endpoint.
fn default_opensearch_url() -> String {
    DEFAULT_OPENSEARCH_URL.to_string()
}

/// Default search index pattern.
fn default_opensearch_index() -> String {
    DEFAULT_OPENSEARCH_INDEX.to_string()
}

/// Default maximum search hits.
const fn default_opensearch_max_hits() -> u32 {
    DEFAULT_OPENSEARCH_MAX_HITS
}

/// Default search timeout.
const fn default_opensearch_timeout_ms() -> u64 {
    DEFAULT_OPENSEARCH_TIMEOUT_MS
}

/// Default broker host.
fn default_rabbitmq_host() -> String {
    DEFAULT_RABBITMQ_HOST.to_string()
}

/// Default broker port.
const fn default_rabbitmq_port() -> u16 {
    DEFAULT_RABBITMQ_PORT
}

/// Default broker credential.
fn default_rabbitmq_credential() -> String {
    DEFAULT_RABBITMQ_CREDENTIAL.to_string()
}

/// Default broker virtual host.
fn default_rabbitmq_vhost() -> String {
    DEFAULT_RABBITMQ_VHOST.to_string()
}

/// Default broker connection timeout.
const fn default_rabbitmq_connect_timeout_ms() -> u64 {
    DEFAULT_RABBITMQ_CONNECT_TIMEOUT_MS
}
