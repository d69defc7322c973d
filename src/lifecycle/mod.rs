//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs, http/server.rs):
//!     Load config → Validate → Build module registry → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Tear down modules → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then modules, then listener
//! - Ordered shutdown: stop accept, drain, release modules
//! - Shutdown has timeout: drain is bounded by `timeouts.drain_secs`

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
