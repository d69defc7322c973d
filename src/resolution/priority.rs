//! Priority-match resolution.
//!
//! # Responsibilities
//! - Order handlers by the weight they earn for a request
//! - Visit them in that order until one produces a response
//!
//! # Design Decisions
//! - Sort key: matched weight (desc), then registration order (asc); the
//!   sort is stable and deterministic
//! - Pattern specificity only picks each handler's own best pattern, it never
//!   reorders handlers against each other
//! - Handlers matching none of the acceptable ranges are skipped entirely

use std::sync::Arc;
use std::time::Duration;

use crate::http::Request;
use crate::module::{Handler, ModuleKind};
use crate::observability::logging::ConnectionLogger;
use crate::resilience::timeouts::invoke_guarded;
use crate::resolution::matcher::{AcceptPattern, CompiledPatterns, PatternMatch};
use crate::resolution::{report_failure, Outcome};

/// A registered handler with its compiled accept patterns.
pub struct HandlerDescriptor {
    name: String,
    index: usize,
    handler: Arc<dyn Handler>,
    patterns: CompiledPatterns,
}

impl HandlerDescriptor {
    /// Register `handler`. `accept` overrides the handler's own declaration.
    ///
    /// Fails with the offending pattern when a weight is not finite or a
    /// pattern is not `type/subtype`.
    pub fn new(
        name: impl Into<String>,
        index: usize,
        handler: Arc<dyn Handler>,
        accept: Option<&[AcceptPattern]>,
    ) -> Result<Self, AcceptPattern> {
        let patterns = match accept {
            Some(declared) => CompiledPatterns::compile(declared)?,
            None => CompiledPatterns::compile(&handler.accept())?,
        };
        Ok(Self {
            name: name.into(),
            index,
            handler,
            patterns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

/// Priority-match strategy over a fixed handler list.
#[derive(Debug)]
pub struct PriorityMatch {
    handlers: Vec<HandlerDescriptor>,
    timeout: Duration,
}

impl PriorityMatch {
    pub fn new(handlers: Vec<HandlerDescriptor>, timeout: Duration) -> Self {
        Self { handlers, timeout }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handlers eligible for `request`, in the order they will be tried.
    pub fn visitation_order(&self, request: &Request) -> Vec<(&HandlerDescriptor, PatternMatch)> {
        let mut order: Vec<(&HandlerDescriptor, PatternMatch)> = self
            .handlers
            .iter()
            .filter_map(|descriptor| {
                descriptor
                    .patterns
                    .best_match(request.accept())
                    .map(|found| (descriptor, found))
            })
            .collect();

        order.sort_by(|(a, a_match), (b, b_match)| {
            b_match
                .weight
                .total_cmp(&a_match.weight)
                .then_with(|| a.index.cmp(&b.index))
        });
        order
    }

    /// Try eligible handlers until one produces a response.
    pub async fn resolve(&self, request: &Arc<Request>, logger: &ConnectionLogger) -> Outcome {
        for (descriptor, found) in self.visitation_order(request) {
            let handler = Arc::clone(&descriptor.handler);
            let call_request = Arc::clone(request);
            let call_logger = logger.clone();
            let result = invoke_guarded(self.timeout, move || {
                handler.handle(&call_request, &call_logger)
            })
            .await;

            match result {
                Ok(Ok(Some(response))) => {
                    tracing::debug!(
                        connection_id = ?logger.connection_id(),
                        handler = %descriptor.name,
                        weight = found.weight,
                        "Request resolved"
                    );
                    return Outcome::Resolved {
                        response: Arc::new(response),
                        handler: descriptor.name.clone(),
                    };
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    report_failure(logger, ModuleKind::Handler, &descriptor.name, &err.to_string())
                }
                Err(err) => {
                    report_failure(logger, ModuleKind::Handler, &descriptor.name, &err.to_string())
                }
            }
        }
        Outcome::Miss
    }
}
