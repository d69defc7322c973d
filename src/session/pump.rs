//! Per-connection parser instance management.
//!
//! # Responsibilities
//! - Create the parser instance bound to the connection logger and a sink
//! - Lend the connection's input to `parse()` on every pump
//! - Hand emitted requests out in emission order
//! - Destroy the instance on stream closure or a fatal parse error
//!
//! # Design Decisions
//! - State machine: Created → Pumping → Closed; no `parse()` after Closed
//! - Parser panics are caught and close the pump like a fatal error

use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::Request;
use crate::module::{ModuleResult, ParseError, Parser, ParserInstance, RequestSink};
use crate::observability::logging::ConnectionLogger;
use crate::resilience::isolation::run_isolated;
use crate::stream::{Connection, InputView};

/// Lifecycle of a connection's parser instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Created,
    Pumping,
    Closed,
}

/// Why the pump stopped.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("parser panicked: {0}")]
    Panicked(String),
}

/// Drives one parser instance over one connection.
pub struct ParserPump {
    instance: Option<Box<dyn ParserInstance>>,
    requests: mpsc::UnboundedReceiver<Request>,
    state: PumpState,
}

impl ParserPump {
    pub fn new(parser: &dyn Parser, logger: ConnectionLogger) -> ModuleResult<Self> {
        let (sink, requests) = RequestSink::channel();
        let instance = parser.create(logger, sink)?;
        Ok(Self {
            instance: Some(instance),
            requests,
            state: PumpState::Created,
        })
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Let the parser consume what `conn` has available.
    ///
    /// Returns the number of bytes the parser pulled. After an error the
    /// instance is gone and later calls return `Ok(0)`.
    pub fn pump(&mut self, conn: &mut dyn Connection) -> Result<usize, PumpError> {
        let Some(instance) = self.instance.as_mut() else {
            return Ok(0);
        };
        self.state = PumpState::Pumping;

        let mut input = InputView::new(conn);
        let result = run_isolated(|| instance.parse(&mut input));
        let pulled = input.bytes_read();

        match result {
            Ok(Ok(())) => Ok(pulled),
            Ok(Err(err)) => {
                self.close();
                Err(err.into())
            }
            Err(panic) => {
                self.close();
                Err(PumpError::Panicked(panic))
            }
        }
    }

    /// Next request emitted by the parser, oldest first.
    pub fn next_request(&mut self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    /// Destroy the parser instance. Requests already emitted stay queued.
    pub fn close(&mut self) {
        self.instance = None;
        self.state = PumpState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::observability::logging::LogFanout;
    use crate::stream::memory::MemoryConnection;
    use crate::stream::{Input, StreamError};
    use std::sync::Arc;

    /// Emits one request per `;`-terminated path.
    struct Splitter;

    struct SplitterInstance {
        sink: RequestSink,
        pending: Vec<u8>,
    }

    impl Parser for Splitter {
        fn create(&self, _logger: ConnectionLogger, sink: RequestSink) -> ModuleResult<Box<dyn ParserInstance>> {
            Ok(Box::new(SplitterInstance {
                sink,
                pending: Vec::new(),
            }))
        }
    }

    impl ParserInstance for SplitterInstance {
        fn parse(&mut self, input: &mut dyn Input) -> Result<(), ParseError> {
            let mut buf = [0u8; 8];
            loop {
                let n = input.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                self.pending.extend_from_slice(&buf[..n]);
            }
            if self.pending.starts_with(b"!") {
                panic!("parser bug");
            }
            while let Some(end) = self.pending.iter().position(|b| *b == b';') {
                let path: Vec<u8> = self.pending.drain(..=end).collect();
                let path = String::from_utf8_lossy(&path[..path.len() - 1]).into_owned();
                self.sink.emit(Request::builder(Method::Get, path).build());
            }
            Ok(())
        }
    }

    fn pump() -> ParserPump {
        ParserPump::new(&Splitter, ConnectionLogger::process(Arc::new(LogFanout::new()))).unwrap()
    }

    #[test]
    fn requests_come_out_in_emission_order() {
        let mut pump = pump();
        assert_eq!(pump.state(), PumpState::Created);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"/one;/two;/thr");

        assert_eq!(pump.pump(&mut conn).unwrap(), 14);
        assert_eq!(pump.state(), PumpState::Pumping);
        assert_eq!(pump.next_request().unwrap().path(), "/one");
        assert_eq!(pump.next_request().unwrap().path(), "/two");
        assert!(pump.next_request().is_none());

        handle.feed(b"ee;");
        pump.pump(&mut conn).unwrap();
        assert_eq!(pump.next_request().unwrap().path(), "/three");
    }

    #[test]
    fn closed_stream_ends_the_pump() {
        let mut pump = pump();
        let (mut conn, handle) = MemoryConnection::new();
        handle.close_input();

        assert!(matches!(
            pump.pump(&mut conn),
            Err(PumpError::Parse(ParseError::Stream(StreamError::Closed)))
        ));
        assert_eq!(pump.state(), PumpState::Closed);
        assert_eq!(pump.pump(&mut conn).unwrap(), 0);
    }

    #[test]
    fn parser_panic_is_contained() {
        let mut pump = pump();
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"!");
        assert!(matches!(pump.pump(&mut conn), Err(PumpError::Panicked(_))));
        assert_eq!(pump.state(), PumpState::Closed);
    }
}
