//! Request resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Request (from the parser, in arrival order)
//!     → engine.rs (policy chosen at startup)
//!         priority:      priority.rs → matcher.rs (accept weights) → first response wins
//!         ordered_chain: chain.rs (seeded 200, mutate in order, stop on non-2xx)
//!     → Outcome::Resolved(response) or Outcome::Miss
//! ```
//!
//! # Design Decisions
//! - Handler lists are compiled at startup and immutable at runtime
//! - Every handler call runs under `timeouts.handler_ms` with panic capture;
//!   a failure is logged and treated as "no result"
//! - Deterministic: same request and handler set always visit in the same order

pub mod chain;
pub mod engine;
pub mod matcher;
pub mod priority;

use std::sync::Arc;

use crate::http::Response;
use crate::module::ModuleKind;
use crate::observability::logging::ConnectionLogger;
use crate::observability::metrics;

pub use chain::{ChainLink, OrderedChain};
pub use engine::ResolutionEngine;
pub use matcher::{AcceptPattern, MediaPattern};
pub use priority::{HandlerDescriptor, PriorityMatch};

/// Result of resolving one request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A handler produced this response.
    Resolved {
        response: Arc<Response>,
        handler: String,
    },
    /// No handler produced a response.
    Miss,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Resolved { .. } => "resolved",
            Outcome::Miss => "miss",
        }
    }
}

pub(crate) fn report_failure(logger: &ConnectionLogger, kind: ModuleKind, name: &str, reason: &str) {
    metrics::record_module_failure(kind.as_str());
    tracing::warn!(connection_id = ?logger.connection_id(), kind = %kind, module = %name, error = %reason, "Handler failed");
    logger.log(&format!("{kind} '{name}' failed: {reason}"));
}
