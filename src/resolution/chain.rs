//! Ordered-chain resolution.
//!
//! # Responsibilities
//! - Seed a `200` response and pass it through every chain handler in
//!   configuration order
//! - Stop right after a handler sets a non-2xx status
//!
//! # Design Decisions
//! - Each handler works on its own copy; the copy replaces the shared
//!   response only when the handler returns `Ok`, so a failed handler leaves
//!   no partial mutation behind
//! - There is no miss: the chain always yields a response

use std::sync::Arc;
use std::time::Duration;

use crate::http::{ChainResponse, Request, Response};
use crate::module::{ChainHandler, ModuleKind};
use crate::observability::logging::ConnectionLogger;
use crate::resilience::timeouts::invoke_guarded;
use crate::resolution::{report_failure, Outcome};

/// One configured chain handler.
pub struct ChainLink {
    name: String,
    handler: Arc<dyn ChainHandler>,
}

impl ChainLink {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ChainHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLink").field("name", &self.name).finish()
    }
}

/// Ordered-chain strategy.
#[derive(Debug)]
pub struct OrderedChain {
    links: Vec<ChainLink>,
    timeout: Duration,
}

impl OrderedChain {
    pub fn new(links: Vec<ChainLink>, timeout: Duration) -> Self {
        Self { links, timeout }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run the chain and return the final structured response.
    pub async fn run(&self, request: &Arc<Request>, logger: &ConnectionLogger) -> ChainResponse {
        let mut current = ChainResponse::default();

        for link in &self.links {
            let handler = Arc::clone(&link.handler);
            let call_request = Arc::clone(request);
            let call_logger = logger.clone();
            let mut working = current.clone();
            let result = invoke_guarded(self.timeout, move || {
                handler
                    .handle(&call_request, &mut working, &call_logger)
                    .map(|()| working)
            })
            .await;

            match result {
                Ok(Ok(updated)) => current = updated,
                Ok(Err(err)) => {
                    report_failure(logger, ModuleKind::ChainHandler, &link.name, &err.to_string());
                    continue;
                }
                Err(err) => {
                    report_failure(logger, ModuleKind::ChainHandler, &link.name, &err.to_string());
                    continue;
                }
            }

            if !current.is_success() {
                tracing::debug!(
                    connection_id = ?logger.connection_id(),
                    handler = %link.name,
                    status = current.status,
                    "Chain terminated"
                );
                break;
            }
        }
        current
    }

    /// Run the chain and serialize the result for the wire.
    pub async fn resolve(&self, request: &Arc<Request>, logger: &ConnectionLogger) -> Outcome {
        let response = self.run(request, logger).await;
        Outcome::Resolved {
            response: Arc::new(Response::from(response)),
            handler: "chain".to_string(),
        }
    }
}
