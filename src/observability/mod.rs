//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection / parser / handler / sniffer log lines:
//!     → logging.rs (ConnectionLogger)
//!     → fanout.rs (one lane per logger module, registration order)
//!
//! Request lifecycle (received, resolved, missed):
//!     → sniffing.rs (SnifferEvent)
//!     → fanout.rs (one lane per sniffer module, registration order)
//!
//! Process-level signals:
//!     → tracing events (structured, connection_id / module fields)
//!     → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Fan-out is fire-and-forget: nothing here can delay a response
//! - Per-target isolation: a failing module is reported, never propagated
//! - tracing is the fallback logger when a module itself fails

pub mod fanout;
pub mod logging;
pub mod metrics;
pub mod sniffing;

pub use logging::{ConnectionLogger, LogFanout};
pub use sniffing::{SnifferEvent, SnifferFanout};
