//! HTTP value types and the server.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one session per client)
//!     → parser module emits request.rs values (immutable, typed context.rs)
//!     → handlers produce response.rs values (bytes, or a ChainResponse)
//!     → session writes them back to the client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::{Context, ContextValue};
pub use request::{Coding, LanguageRange, MediaRange, Method, Request, RequestBuilder};
pub use response::{ChainResponse, Response};
pub use server::{Server, ServerContext, ServerError};
