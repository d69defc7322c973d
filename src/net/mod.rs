//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, live table, drain tracking)
//!     → tcp.rs (base Connection over try_read / try_write)
//!     → Hand off to the session layer (wrapper, parser, resolution)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Transport security belongs to the connection-wrapper module, not here

pub mod connection;
pub mod listener;
pub mod tcp;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tcp::TcpConnection;
