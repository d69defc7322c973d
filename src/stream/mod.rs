//! Stream abstraction subsystem.
//!
//! # Data Flow
//! ```text
//! accepted socket
//!     → net::connection::TcpConnection (base connection)
//!     → optional ConnectionWrapper module (derived connection)
//!     → session reads through InputView (lent to the parser)
//!     → session writes through writer.rs (retry with backoff)
//! ```
//!
//! # Design Decisions
//! - `read`/`write` never block: `Ok(0)` means "try later", never EOF
//! - Peer closure is an explicit `StreamError::Closed`
//! - The connection owns the stream; parser and writer only borrow it
//! - A derived connection owns its base, so the base is released last

pub mod memory;
pub mod writer;

use std::time::Duration;

use thiserror::Error;

pub use writer::{write_all, WritePolicy};

/// Errors raised by stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer closed the stream.
    #[error("stream closed by peer")]
    Closed,

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Write availability never came back within the allowed window.
    #[error("write stalled for {waited:?} with {remaining} bytes pending")]
    WriteTimeout {
        /// Time spent waiting for the stream to accept bytes.
        waited: Duration,
        /// Bytes that were never accepted.
        remaining: usize,
    },
}

/// Non-blocking input stream.
pub trait Input {
    /// Copy currently available bytes into `buf`.
    ///
    /// Returns the number of bytes copied; `0` means no data is available now.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;
}

/// Non-blocking output stream.
pub trait Output {
    /// Offer `buf` to the stream.
    ///
    /// Returns the number of bytes accepted; `0` means the stream is not
    /// writable right now and the caller should retry later.
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError>;
}

/// A client connection: a duplex non-blocking stream with an attached log sink.
///
/// Implementations are driven from a single session task at a time, so
/// `Send` is enough; they are never shared between tasks.
pub trait Connection: Input + Output + Send {
    /// Log a line on behalf of this connection.
    fn log(&self, line: &str);
}

/// Boxed connection as handled by sessions and wrappers.
pub type BoxConnection = Box<dyn Connection>;

/// Read-only view of a connection lent to a parser instance.
///
/// Counts the bytes pulled through it so the session knows whether the
/// client was active during a pump.
pub struct InputView<'a> {
    conn: &'a mut dyn Connection,
    bytes_read: usize,
}

impl<'a> InputView<'a> {
    /// Borrow the input side of `conn`.
    pub fn new(conn: &'a mut dyn Connection) -> Self {
        Self {
            conn,
            bytes_read: 0,
        }
    }

    /// Bytes read through this view so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}

impl Input for InputView<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let n = self.conn.read(buf)?;
        self.bytes_read += n;
        Ok(n)
    }
}
