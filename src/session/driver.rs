//! The per-connection loop.
//!
//! # Responsibilities
//! - Apply the connection wrapper, create the parser pump
//! - Poll the parser with idle backoff; close idle clients
//! - Resolve requests strictly one at a time, in emission order
//! - Notify sniffers and write responses with bounded retry
//!
//! # Design Decisions
//! - Request N+1 is not resolved before request N's response is fully written
//! - Requests emitted before a parse error or peer close are still served
//! - Every way a session can end is a [`SessionEnd`] value, never a panic

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::http::response::status_only;
use crate::http::{ChainResponse, Request, Response};
use crate::lifecycle::ShutdownSignal;
use crate::module::{ModuleRegistry, ParseError};
use crate::net::connection::ConnectionId;
use crate::observability::logging::ConnectionLogger;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::isolation::run_isolated;
use crate::resolution::Outcome;
use crate::session::pump::{ParserPump, PumpError};
use crate::stream::{write_all, BoxConnection, Connection, StreamError, WritePolicy};

/// Session tuning taken from the server configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub write: WritePolicy,
    pub idle_timeout: Duration,
    pub poll_min_ms: u64,
    pub poll_max_ms: u64,
    pub respond_to_miss: bool,
    pub parse_error_response: bool,
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            write: WritePolicy {
                timeout: config.timeouts.write(),
                base_delay_ms: config.polling.min_interval_ms,
                max_delay_ms: config.polling.max_interval_ms,
            },
            idle_timeout: config.timeouts.idle(),
            poll_min_ms: config.polling.min_interval_ms,
            poll_max_ms: config.polling.max_interval_ms,
            respond_to_miss: config.resolution.respond_to_miss,
            parse_error_response: config.server.parse_error_response,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its side.
    PeerClosed,
    /// A request asked for `Connection: close`.
    CloseRequested,
    IdleTimeout,
    /// Input could not be parsed.
    ParseError,
    ParserFailed,
    WriteTimeout,
    TransportError,
    WrapperFailed,
    Shutdown,
}

impl SessionEnd {
    pub fn label(&self) -> &'static str {
        match self {
            SessionEnd::PeerClosed => "peer_closed",
            SessionEnd::CloseRequested => "close_requested",
            SessionEnd::IdleTimeout => "idle_timeout",
            SessionEnd::ParseError => "parse_error",
            SessionEnd::ParserFailed => "parser_failed",
            SessionEnd::WriteTimeout => "write_timeout",
            SessionEnd::TransportError => "transport_error",
            SessionEnd::WrapperFailed => "wrapper_failed",
            SessionEnd::Shutdown => "shutdown",
        }
    }
}

/// One client connection being served.
pub struct Session<'a> {
    id: ConnectionId,
    registry: &'a ModuleRegistry,
    settings: &'a SessionSettings,
    logger: ConnectionLogger,
}

impl<'a> Session<'a> {
    pub fn new(id: ConnectionId, registry: &'a ModuleRegistry, settings: &'a SessionSettings) -> Self {
        Self {
            id,
            registry,
            settings,
            logger: registry.connection_logger(id),
        }
    }

    pub fn logger(&self) -> &ConnectionLogger {
        &self.logger
    }

    /// Serve `base` until the client leaves, an error ends the session, or
    /// shutdown is signalled.
    pub async fn run(&self, base: BoxConnection, mut shutdown: ShutdownSignal) -> SessionEnd {
        let Some(mut conn) = self.wrap(base) else {
            return SessionEnd::WrapperFailed;
        };

        let mut pump = match ParserPump::new(self.registry.parser(), self.logger.clone()) {
            Ok(pump) => pump,
            Err(err) => {
                tracing::error!(connection_id = %self.id, error = %err, "Parser instance creation failed");
                conn.log(&format!("parser instance creation failed: {err}"));
                return SessionEnd::ParserFailed;
            }
        };

        let mut idle = Backoff::new(self.settings.poll_min_ms, self.settings.poll_max_ms);
        let mut last_activity = Instant::now();

        loop {
            if shutdown.is_triggered() {
                return SessionEnd::Shutdown;
            }

            let pumped = pump.pump(conn.as_mut());

            while let Some(request) = pump.next_request() {
                let close_after = request.close_connection();
                if let Err(end) = self.serve(conn.as_mut(), request).await {
                    return end;
                }
                last_activity = Instant::now();
                if close_after {
                    return SessionEnd::CloseRequested;
                }
                if shutdown.is_triggered() {
                    return SessionEnd::Shutdown;
                }
            }

            match pumped {
                Ok(0) => {}
                Ok(_) => {
                    idle.reset();
                    last_activity = Instant::now();
                    continue;
                }
                Err(err) => return self.pump_failed(conn.as_mut(), err).await,
            }

            if last_activity.elapsed() >= self.settings.idle_timeout {
                tracing::debug!(connection_id = %self.id, "Closing idle connection");
                return SessionEnd::IdleTimeout;
            }

            tokio::select! {
                _ = tokio::time::sleep(idle.next_delay()) => {}
                _ = shutdown.recv() => return SessionEnd::Shutdown,
            }
        }
    }

    fn wrap(&self, base: BoxConnection) -> Option<BoxConnection> {
        let Some(wrapper) = self.registry.wrapper() else {
            return Some(base);
        };
        let failure = match run_isolated(|| wrapper.wrap(base, &self.logger)) {
            Ok(Ok(derived)) => return Some(derived),
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("panicked: {panic}"),
        };
        metrics::record_module_failure("wrapper");
        tracing::warn!(connection_id = %self.id, error = %failure, "Connection wrapper failed, dropping client");
        self.logger.log(&format!("connection wrapper failed: {failure}"));
        None
    }

    /// Resolve one request and write its response.
    async fn serve(&self, conn: &mut dyn Connection, request: Request) -> Result<(), SessionEnd> {
        let started = Instant::now();
        let request = Arc::new(request);
        let sniffers = self.registry.sniffers();

        sniffers.got_request(&request, &self.logger);
        let outcome = self.registry.engine().resolve(&request, &self.logger).await;

        let response = match &outcome {
            Outcome::Resolved { response, .. } => {
                sniffers.got_response(&request, response, &self.logger);
                Some(Arc::clone(response))
            }
            Outcome::Miss => {
                sniffers.got_request_miss(&request, &self.logger);
                tracing::debug!(connection_id = %self.id, path = request.path(), "No handler produced a response");
                self.settings
                    .respond_to_miss
                    .then(|| Arc::new(Response::from(ChainResponse::new(404))))
            }
        };

        if let Some(response) = response {
            self.write(conn, &response.data).await?;
        }
        metrics::record_request(outcome.label(), started);
        Ok(())
    }

    async fn write(&self, conn: &mut dyn Connection, bytes: &[u8]) -> Result<(), SessionEnd> {
        match write_all(conn, bytes, &self.settings.write).await {
            Ok(()) => Ok(()),
            Err(StreamError::WriteTimeout { waited, remaining }) => {
                tracing::warn!(
                    connection_id = %self.id,
                    waited_ms = waited.as_millis() as u64,
                    remaining,
                    "Write stalled, dropping connection"
                );
                conn.log(&format!(
                    "write stalled for {waited:?} with {remaining} bytes pending, dropping connection"
                ));
                Err(SessionEnd::WriteTimeout)
            }
            Err(StreamError::Closed) => Err(SessionEnd::PeerClosed),
            Err(err) => {
                tracing::warn!(connection_id = %self.id, error = %err, "Write failed");
                Err(SessionEnd::TransportError)
            }
        }
    }

    async fn pump_failed(&self, conn: &mut dyn Connection, err: PumpError) -> SessionEnd {
        match err {
            PumpError::Parse(ParseError::Stream(StreamError::Closed)) => SessionEnd::PeerClosed,
            PumpError::Parse(ParseError::Stream(err)) => {
                tracing::debug!(connection_id = %self.id, error = %err, "Read failed");
                SessionEnd::TransportError
            }
            PumpError::Parse(err) => {
                tracing::debug!(connection_id = %self.id, error = %err, "Unparseable request");
                conn.log(&format!("parse error: {err}"));
                if self.settings.parse_error_response {
                    // Best effort; the connection is dropped either way.
                    let _ = self.write(conn, &status_only(400).data).await;
                }
                SessionEnd::ParseError
            }
            PumpError::Panicked(panic) => {
                metrics::record_module_failure("parser");
                tracing::error!(connection_id = %self.id, panic = %panic, "Parser panicked");
                conn.log(&format!("parser panicked: {panic}"));
                SessionEnd::ParserFailed
            }
        }
    }
}
