//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handler invocation:
//!     → timeouts.rs (blocking pool + deadline, panic capture)
//!     → failure treated as "no result" by the resolution engine
//!
//! Sniffer / logger delivery:
//!     → isolation.rs (catch_unwind per call)
//!
//! Writes and idle polling:
//!     → backoff.rs (exponential backoff with jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every handler call has a deadline
//! - A misbehaving module never takes down its connection, let alone the server
//! - Jittered backoff keeps idle connections from polling in lockstep

pub mod backoff;
pub mod isolation;
pub mod timeouts;
