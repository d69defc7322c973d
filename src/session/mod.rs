//! Session subsystem: everything that happens on one client connection.
//!
//! # Data Flow
//! ```text
//! base Connection (tcp or in-memory)
//!     → wrapper module (optional, once)
//!     → pump.rs (parser instance, lent input, FIFO request queue)
//!     → driver.rs (resolve → sniffers → write_all, one request at a time)
//!     → SessionEnd
//! ```
//!
//! # Design Decisions
//! - Poll-driven: an idle client costs a sleeping task with capped backoff
//! - Sessions borrow the registry; they never own module instances

pub mod driver;
pub mod pump;

pub use driver::{Session, SessionEnd, SessionSettings};
pub use pump::{ParserPump, PumpError, PumpState};
