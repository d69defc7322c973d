//! Modular HTTP server library.
//!
//! The orchestration core: owns client connections, drives a pluggable
//! parser, resolves requests against pluggable handlers, and fans events out
//! to pluggable sniffers and loggers.

// Core subsystems
pub mod config;
pub mod http;
pub mod module;
pub mod net;
pub mod resolution;
pub mod session;
pub mod stream;

// Modules shipped with the server
pub mod builtin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServerConfig;
pub use http::{Server, ServerError};
pub use lifecycle::Shutdown;
pub use module::{ModuleCatalog, ModuleRegistry};
