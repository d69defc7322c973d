//! Module contracts, one trait per kind.
//!
//! # Design Decisions
//! - Calls are synchronous from the module's point of view; the server wraps
//!   them with timeouts and panic isolation where needed
//! - `Handler` (priority match) and `ChainHandler` (ordered chain) are distinct
//!   traits so the two resolution policies never share a handler list

use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::{ChainResponse, Request, Response};
use crate::module::ModuleResult;
use crate::observability::logging::ConnectionLogger;
use crate::resolution::matcher::AcceptPattern;
use crate::stream::{BoxConnection, Input, StreamError};

/// Receives module and connection log lines.
pub trait Logger: Send + Sync {
    fn log(&self, line: &str);
}

/// Replaces a client's base connection with a derived one (e.g. TLS).
pub trait ConnectionWrapper: Send + Sync {
    /// Called once per accepted client.
    ///
    /// The derived connection takes ownership of `base` and must release it
    /// only after its own teardown.
    fn wrap(&self, base: BoxConnection, logger: &ConnectionLogger) -> ModuleResult<BoxConnection>;
}

/// Error that ends parsing on a connection.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Where a parser instance delivers complete requests, in arrival order.
#[derive(Clone, Debug)]
pub struct RequestSink {
    tx: mpsc::UnboundedSender<Request>,
}

impl RequestSink {
    /// A sink plus the receiving end drained by the session.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, request: Request) {
        // Receiver gone means the session is tearing down.
        let _ = self.tx.send(request);
    }
}

/// Creates one parser instance per connection.
pub trait Parser: Send + Sync {
    fn create(
        &self,
        logger: ConnectionLogger,
        sink: RequestSink,
    ) -> ModuleResult<Box<dyn ParserInstance>>;
}

/// Per-connection parsing state.
pub trait ParserInstance: Send {
    /// Consume whatever `input` has available and emit every complete request.
    ///
    /// Must not block. Partial messages stay buffered inside the instance.
    fn parse(&mut self, input: &mut dyn Input) -> Result<(), ParseError>;
}

/// Priority-match handler.
pub trait Handler: Send + Sync {
    /// Media-type patterns this handler serves, with their weights.
    fn accept(&self) -> Vec<AcceptPattern>;

    /// Produce a response, or `None` to let the next handler try.
    fn handle(&self, request: &Request, logger: &ConnectionLogger) -> ModuleResult<Option<Response>>;
}

/// Ordered-chain handler: mutates a shared response in configuration order.
pub trait ChainHandler: Send + Sync {
    fn handle(
        &self,
        request: &Request,
        response: &mut ChainResponse,
        logger: &ConnectionLogger,
    ) -> ModuleResult<()>;
}

/// Observes request lifecycle events without affecting resolution.
pub trait Sniffer: Send + Sync {
    fn got_request(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<()> {
        Ok(())
    }

    fn got_response(
        &self,
        _request: &Request,
        _response: &Response,
        _logger: &ConnectionLogger,
    ) -> ModuleResult<()> {
        Ok(())
    }

    fn got_request_miss(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<()> {
        Ok(())
    }
}
