//! Resolution strategy selected once per server.

use std::sync::Arc;

use crate::config::ResolutionPolicy;
use crate::http::Request;
use crate::observability::logging::ConnectionLogger;
use crate::resolution::chain::OrderedChain;
use crate::resolution::priority::PriorityMatch;
use crate::resolution::Outcome;

/// The handler list of a server, under one resolution policy.
#[derive(Debug)]
pub enum ResolutionEngine {
    Priority(PriorityMatch),
    OrderedChain(OrderedChain),
}

impl ResolutionEngine {
    pub fn policy(&self) -> ResolutionPolicy {
        match self {
            ResolutionEngine::Priority(_) => ResolutionPolicy::Priority,
            ResolutionEngine::OrderedChain(_) => ResolutionPolicy::OrderedChain,
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        match self {
            ResolutionEngine::Priority(engine) => engine.len(),
            ResolutionEngine::OrderedChain(chain) => chain.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve one request. Handler failures never escape this call.
    pub async fn resolve(&self, request: &Arc<Request>, logger: &ConnectionLogger) -> Outcome {
        match self {
            ResolutionEngine::Priority(engine) => engine.resolve(request, logger).await,
            ResolutionEngine::OrderedChain(chain) => chain.resolve(request, logger).await,
        }
    }
}
