//! In-memory connection for tests and embedding.
//!
//! The test side keeps a [`MemoryHandle`] to feed client bytes, inspect what
//! the server wrote, and simulate a peer that closes or stops reading.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::observability::logging::ConnectionLogger;
use crate::stream::{Connection, Input, Output, StreamError};

#[derive(Debug, Default)]
struct MemoryState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    input_closed: bool,
    writes_stalled: bool,
    write_chunk: Option<usize>,
    logs: Vec<String>,
    dropped: bool,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection backed by in-memory buffers.
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    logger: Option<ConnectionLogger>,
}

impl MemoryConnection {
    /// Create a connection and the handle controlling its peer side.
    pub fn new() -> (Self, MemoryHandle) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        let handle = MemoryHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                logger: None,
            },
            handle,
        )
    }

    /// Forward this connection's log lines to `logger` as well.
    pub fn with_logger(mut self, logger: ConnectionLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl Input for MemoryConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let mut state = lock(&self.state);
        if state.input.is_empty() {
            return if state.input_closed {
                Err(StreamError::Closed)
            } else {
                Ok(0)
            };
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Output for MemoryConnection {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        let mut state = lock(&self.state);
        if state.writes_stalled {
            return Ok(0);
        }
        let n = state.write_chunk.map_or(buf.len(), |chunk| chunk.min(buf.len()));
        state.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl Connection for MemoryConnection {
    fn log(&self, line: &str) {
        lock(&self.state).logs.push(line.to_string());
        if let Some(logger) = &self.logger {
            logger.log(line);
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        lock(&self.state).dropped = true;
    }
}

/// Peer-side controls of a [`MemoryConnection`].
#[derive(Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHandle {
    /// Make `bytes` available to the server's next reads.
    pub fn feed(&self, bytes: &[u8]) {
        lock(&self.state).input.extend(bytes.iter().copied());
    }

    /// Close the client's sending side once the pending input is consumed.
    pub fn close_input(&self) {
        lock(&self.state).input_closed = true;
    }

    /// Make every write return 0 (or resume normal writes).
    pub fn stall_writes(&self, stalled: bool) {
        lock(&self.state).writes_stalled = stalled;
    }

    /// Accept at most `chunk` bytes per write call.
    pub fn limit_write_chunk(&self, chunk: usize) {
        lock(&self.state).write_chunk = Some(chunk.max(1));
    }

    /// Everything the server wrote so far.
    pub fn output(&self) -> Vec<u8> {
        lock(&self.state).output.clone()
    }

    /// Server output decoded lossily as text.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.state).output).into_owned()
    }

    /// Lines logged on the connection itself.
    pub fn logs(&self) -> Vec<String> {
        lock(&self.state).logs.clone()
    }

    /// Whether the server side has released the connection.
    pub fn is_dropped(&self) -> bool {
        lock(&self.state).dropped
    }
}
