//! Module subsystem.
//!
//! # Data Flow
//! ```text
//! [modules] config section
//!     → catalog.rs (module id → named constructor, per kind)
//!     → conf.rs (one isolated ConfigHandle per instance, pre-loaded blob)
//!     → registry.rs (live instances, init order, reverse teardown)
//!     → consumed by sessions, resolution engine and fan-outs
//! ```
//!
//! # Design Decisions
//! - One trait per module kind, selected at configuration time
//! - Modules are shared across connections: traits take `&self` and require
//!   `Send + Sync`; a module keeping state synchronizes it itself
//! - Parser *instances* are per connection and never shared

pub mod catalog;
pub mod conf;
pub mod kinds;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::ModuleCatalog;
pub use conf::{ConfigFormat, ConfigHandle};
pub use kinds::{
    ChainHandler, ConnectionWrapper, Handler, Logger, ParseError, Parser, ParserInstance,
    RequestSink, Sniffer,
};
pub use registry::{ModuleRegistry, ModuleSnapshot, RegistryError};

/// Error reported by a module implementation.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module could not do what was asked.
    #[error("{0}")]
    Failed(String),

    /// The module's configuration blob is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ModuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for module calls.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// The kinds of pluggable module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Logger,
    Wrapper,
    Parser,
    Handler,
    ChainHandler,
    Sniffer,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Logger => "logger",
            ModuleKind::Wrapper => "wrapper",
            ModuleKind::Parser => "parser",
            ModuleKind::Handler => "handler",
            ModuleKind::ChainHandler => "chain_handler",
            ModuleKind::Sniffer => "sniffer",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
