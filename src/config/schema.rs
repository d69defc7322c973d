//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::module::{ConfigFormat, ConfigHandle};
use crate::resolution::matcher::AcceptPattern;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Session poll loop tuning.
    pub polling: PollingConfig,

    /// Request resolution policy.
    pub resolution: ResolutionConfig,

    /// Protocol-level behaviour of the session loop.
    pub server: ServerBehaviorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Module slots.
    pub modules: ModulesConfig,
}

impl ServerConfig {
    /// Configuration used when no file is given: the `http1` parser, a
    /// catch-all static handler and the `tracing` logger.
    pub fn builtin() -> Self {
        let mut config = Self::default();
        config.modules.loggers.push(ModuleEntry::new("tracing"));
        config.modules.parser = Some(ModuleEntry::new("http1"));
        config.modules.handlers.push(ModuleEntry::new("static"));
        config
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for a single handler invocation, in milliseconds.
    pub handler_ms: u64,

    /// Time a response may wait for write availability, in milliseconds.
    pub write_ms: u64,

    /// Idle connection timeout in seconds.
    pub idle_secs: u64,

    /// Time allowed for open connections to finish on shutdown, in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn handler(&self) -> Duration {
        Duration::from_millis(self.handler_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handler_ms: 5_000,
            write_ms: 10_000,
            idle_secs: 60,
            drain_secs: 30,
        }
    }
}

/// Session poll loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay after the first idle pump, in milliseconds.
    pub min_interval_ms: u64,

    /// Backoff ceiling while the client stays idle, in milliseconds.
    pub max_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1,
            max_interval_ms: 50,
        }
    }
}

/// Which handler contract the server resolves requests with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Weighted accept-pattern matching; first produced response wins.
    #[default]
    Priority,
    /// Configuration-ordered chain mutating one response.
    OrderedChain,
}

/// Resolution configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub policy: ResolutionPolicy,

    /// Write a 404 when no handler produced a response.
    pub respond_to_miss: bool,
}

/// Session behaviour configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerBehaviorConfig {
    /// Answer unparseable input with `400 Bad Request` before closing.
    pub parse_error_response: bool,
}

impl Default for ServerBehaviorConfig {
    fn default() -> Self {
        Self {
            parse_error_response: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Module slots, in initialization order.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ModulesConfig {
    pub loggers: Vec<ModuleEntry>,

    /// At most one connection wrapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<ModuleEntry>,

    /// Exactly one parser is required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<ModuleEntry>,

    /// Handlers in registration order; chain handlers under `ordered_chain`.
    pub handlers: Vec<ModuleEntry>,

    pub sniffers: Vec<ModuleEntry>,
}

/// One configured module instance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModuleEntry {
    /// Catalog identifier of the module.
    pub module: String,

    /// Configuration blob handed to the module's ConfigHandle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,

    /// Format of a string `config`; tables are always JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ConfigFormat>,

    /// Replaces the handler's declared accept patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<AcceptPattern>>,
}

impl ModuleEntry {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            config: None,
            format: None,
            accept: None,
        }
    }

    pub fn with_config(mut self, config: toml::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_accept(mut self, accept: Vec<AcceptPattern>) -> Self {
        self.accept = Some(accept);
        self
    }

    /// Build the ConfigHandle this entry's module instance starts with.
    ///
    /// Strings are forwarded verbatim with the declared format; any other
    /// value is re-encoded as JSON.
    pub fn config_handle(&self) -> Result<ConfigHandle, serde_json::Error> {
        Ok(match &self.config {
            None => ConfigHandle::new(),
            Some(toml::Value::String(text)) => ConfigHandle::preloaded(
                self.format.unwrap_or_default(),
                text.clone().into_bytes(),
            ),
            Some(value) => ConfigHandle::preloaded(ConfigFormat::Json, serde_json::to_vec(value)?),
        })
    }

    /// Replace the blob with what a module wrote to its handle.
    ///
    /// JSON objects become TOML tables; other UTF-8 contents are kept as a
    /// string with their format. Returns `false` for contents that cannot be
    /// represented in the document (binary data).
    pub fn store_blob(&mut self, format: ConfigFormat, data: &[u8]) -> bool {
        if data.is_empty() {
            self.config = None;
            self.format = None;
            return true;
        }
        if format == ConfigFormat::Json {
            if let Ok(table @ toml::Value::Table(_)) = serde_json::from_slice::<toml::Value>(data) {
                self.config = Some(table);
                self.format = None;
                return true;
            }
        }
        match std::str::from_utf8(data) {
            Ok(text) => {
                self.config = Some(toml::Value::String(text.to_string()));
                self.format = Some(format);
                true
            }
            Err(_) => false,
        }
    }
}
