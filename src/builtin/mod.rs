//! Modules shipped with the server.
//!
//! Registered under these identifiers by [`ModuleCatalog::builtin`]:
//!
//! | kind          | id           | config (JSON)                                        |
//! |---------------|--------------|------------------------------------------------------|
//! | logger        | `tracing`    | `level`                                              |
//! | logger        | `file`       | `path`                                               |
//! | parser        | `http1`      | `max_head_bytes`, `max_body_bytes`                   |
//! | handler       | `static`     | `status`, `content_type`, `body`, `path_prefix`, `accept` |
//! | chain handler | `headers`    | `headers`, `status`                                  |
//! | sniffer       | `access_log` | none                                                 |

pub mod access_log;
pub mod headers;
pub mod http1;
pub mod loggers;
pub mod static_handler;

use std::sync::Arc;

use crate::module::ModuleCatalog;

pub use access_log::AccessLog;
pub use headers::HeadersHandler;
pub use http1::Http1Parser;
pub use loggers::{FileLogger, TracingLogger};
pub use static_handler::StaticHandler;

/// Add every built-in module to `catalog`.
pub fn register_all(catalog: &mut ModuleCatalog) {
    catalog
        .register_logger("tracing", |conf| Ok(Arc::new(TracingLogger::from_config(&conf)?)))
        .register_logger("file", |conf| Ok(Arc::new(FileLogger::from_config(&conf)?)))
        .register_parser("http1", |conf| Ok(Arc::new(Http1Parser::from_config(&conf)?)))
        .register_handler("static", |conf| Ok(Arc::new(StaticHandler::from_config(&conf)?)))
        .register_chain_handler("headers", |conf| Ok(Arc::new(HeadersHandler::from_config(&conf)?)))
        .register_sniffer("access_log", |_conf| Ok(Arc::new(AccessLog)));
}
