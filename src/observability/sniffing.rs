//! Sniffer notification fan-out.
//!
//! # Responsibilities
//! - Turn request lifecycle points into sniffer events
//! - Deliver each event to every sniffer in registration order
//! - Report failing sniffers through the connection logger
//!
//! # Design Decisions
//! - Fire-and-forget: notifying never delays the response write
//! - Outcome of a sniffer call never feeds back into resolution

use std::sync::Arc;
use std::time::Duration;

use crate::http::{Request, Response};
use crate::module::{ModuleResult, Sniffer};
use crate::observability::fanout::Fanout;
use crate::observability::logging::ConnectionLogger;
use crate::observability::metrics;
use crate::resilience::isolation::run_isolated;

/// A request lifecycle point observed by sniffers.
#[derive(Clone, Debug)]
pub enum SnifferEvent {
    GotRequest {
        request: Arc<Request>,
        logger: ConnectionLogger,
    },
    GotResponse {
        request: Arc<Request>,
        response: Arc<Response>,
        logger: ConnectionLogger,
    },
    GotRequestMiss {
        request: Arc<Request>,
        logger: ConnectionLogger,
    },
}

impl SnifferEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SnifferEvent::GotRequest { .. } => "got_request",
            SnifferEvent::GotResponse { .. } => "got_response",
            SnifferEvent::GotRequestMiss { .. } => "got_request_miss",
        }
    }

    pub fn logger(&self) -> &ConnectionLogger {
        match self {
            SnifferEvent::GotRequest { logger, .. }
            | SnifferEvent::GotResponse { logger, .. }
            | SnifferEvent::GotRequestMiss { logger, .. } => logger,
        }
    }

    fn deliver(&self, sniffer: &dyn Sniffer) -> ModuleResult<()> {
        match self {
            SnifferEvent::GotRequest { request, logger } => sniffer.got_request(request, logger),
            SnifferEvent::GotResponse {
                request,
                response,
                logger,
            } => sniffer.got_response(request, response, logger),
            SnifferEvent::GotRequestMiss { request, logger } => {
                sniffer.got_request_miss(request, logger)
            }
        }
    }
}

/// Delivers request lifecycle events to every registered sniffer.
pub struct SnifferFanout {
    lanes: Fanout<SnifferEvent>,
}

impl SnifferFanout {
    pub fn new() -> Self {
        Self {
            lanes: Fanout::new("sniffer"),
        }
    }

    pub fn register(&self, name: &str, sniffer: Arc<dyn Sniffer>) -> std::io::Result<()> {
        let module = name.to_string();
        self.lanes.add_lane(name, move |event: SnifferEvent| {
            let failure = match run_isolated(|| event.deliver(sniffer.as_ref())) {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => format!("panicked: {panic}"),
            };
            metrics::record_module_failure("sniffer");
            tracing::warn!(module = %module, event = event.name(), error = %failure, "Sniffer failed");
            event
                .logger()
                .log(&format!("sniffer '{module}' failed on {}: {failure}", event.name()));
        })
    }

    pub fn got_request(&self, request: &Arc<Request>, logger: &ConnectionLogger) {
        self.lanes.publish(SnifferEvent::GotRequest {
            request: Arc::clone(request),
            logger: logger.clone(),
        });
    }

    pub fn got_response(&self, request: &Arc<Request>, response: &Arc<Response>, logger: &ConnectionLogger) {
        self.lanes.publish(SnifferEvent::GotResponse {
            request: Arc::clone(request),
            response: Arc::clone(response),
            logger: logger.clone(),
        });
    }

    pub fn got_request_miss(&self, request: &Arc<Request>, logger: &ConnectionLogger) {
        self.lanes.publish(SnifferEvent::GotRequestMiss {
            request: Arc::clone(request),
            logger: logger.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn close(&self, grace: Duration) {
        self.lanes.close(grace);
    }
}

impl Default for SnifferFanout {
    fn default() -> Self {
        Self::new()
    }
}
