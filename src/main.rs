//! modular-httpd
//!
//! A modular HTTP server: a pluggable parser, handlers, sniffers and loggers
//! orchestrated over non-blocking client connections.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                ┌──────────────────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ net::listener ─▶ session::driver                        │
//!                           │                    │  wrapper module (optional)          │
//!                           │                    │  session::pump ─▶ parser module     │
//!                           │                    ▼                                     │
//!                           │              resolution::engine ─▶ handler modules       │
//!                           │                    │                                     │
//!     ◀─────────────────────┼── stream::writer ◀─┘        observability::sniffing ─▶ sniffers
//!                           │                             observability::logging  ─▶ loggers
//!                           │                                                          │
//!                           │  module::registry (catalog, config handles, teardown)    │
//!                           │  config · lifecycle · resilience · metrics               │
//!                           └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use modular_httpd::config::{load_config, validate_config, ServerConfig};
use modular_httpd::http::Server;
use modular_httpd::lifecycle::{signals, Shutdown};
use modular_httpd::module::ModuleCatalog;
use modular_httpd::net::Listener;
use modular_httpd::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "modular-httpd", version, about = "Modular HTTP server")]
struct Args {
    /// TOML configuration file; the built-in configuration is used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration, build the modules, and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = ServerConfig::builtin();
            validate_config(&config).map_err(modular_httpd::config::ConfigError::Validation)?;
            config
        }
    };

    logging::init_tracing(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "modular-httpd starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        policy = ?config.resolution.policy,
        handler_timeout_ms = config.timeouts.handler_ms,
        "Configuration loaded"
    );

    let catalog = ModuleCatalog::builtin();

    if args.check {
        let server = Server::new(config, &catalog)?;
        for omitted in server.registry().omitted() {
            println!("omitted: {omitted}");
        }
        for (kind, names) in catalog.describe() {
            println!("{kind}: {}", names.join(", "));
        }
        println!("configuration ok");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind = config.listener.clone();
    let server = Server::new(config, &catalog)?;
    let listener = Listener::bind(&bind).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
