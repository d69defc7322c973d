//! Server setup and the accept loop.
//!
//! # Responsibilities
//! - Build the module registry from configuration
//! - Accept clients and run one session task per connection
//! - Track connections and drain them on shutdown
//! - Release the module registry after the last session
//!
//! # Design Decisions
//! - Sessions share one `Arc<ServerContext>`; the registry is torn down
//!   only once no session holds it
//! - Accept errors are logged and retried with backoff; they never stop the server

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::module::{ModuleCatalog, ModuleRegistry, RegistryError};
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tcp::TcpConnection;
use crate::observability::logging::ConnectionLogger;
use crate::resilience::backoff::Backoff;
use crate::session::{Session, SessionEnd, SessionSettings};
use crate::stream::BoxConnection;

/// Error type for server startup and the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("module setup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// State shared by every session of a server.
pub struct ServerContext {
    registry: ModuleRegistry,
    settings: SessionSettings,
}

impl ServerContext {
    pub fn new(registry: ModuleRegistry, settings: SessionSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn connection_logger(&self, id: ConnectionId) -> ConnectionLogger {
        self.registry.connection_logger(id)
    }

    /// Run a session over `base` until it ends.
    pub async fn serve(&self, id: ConnectionId, base: BoxConnection, shutdown: ShutdownSignal) -> SessionEnd {
        Session::new(id, &self.registry, &self.settings)
            .run(base, shutdown)
            .await
    }
}

/// A configured server, ready to accept connections.
pub struct Server {
    config: ServerConfig,
    context: Arc<ServerContext>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl Server {
    /// Build every configured module. Fails if the parser cannot be built.
    pub fn new(config: ServerConfig, catalog: &ModuleCatalog) -> Result<Self, ServerError> {
        let registry = ModuleRegistry::load(&config, catalog)?;
        let settings = SessionSettings::from_config(&config);
        Ok(Self {
            drain_timeout: config.timeouts.drain(),
            context: Arc::new(ServerContext::new(registry, settings)),
            tracker: ConnectionTracker::new(),
            config,
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.context.registry()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// The configuration document with module blobs as the modules hold them now.
    pub fn current_config(&self) -> ServerConfig {
        self.config
            .with_module_snapshot(&self.context.registry().snapshot())
    }

    /// Serve one already-established connection, tracked like an accepted one.
    pub async fn serve_connection(&self, base: BoxConnection, shutdown: ShutdownSignal) -> SessionEnd {
        let guard = self.tracker.track(None);
        let end = self.context.serve(guard.id(), base, shutdown).await;
        tracing::debug!(connection_id = %guard.id(), reason = end.label(), "Session ended");
        end
    }

    /// Accept connections until `shutdown` triggers, drain, then release modules.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, policy = ?self.registry().engine().policy(), "Server starting");

        let mut stop = shutdown.subscribe();
        let mut accept_backoff = Backoff::new(10, 1_000);

        loop {
            let accepted = tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => {
                    accept_backoff.reset();
                    accepted
                }
                Err(err @ ListenerError::LimitClosed(_)) => return Err(err.into()),
                Err(err) => {
                    let delay = accept_backoff.next_delay();
                    tracing::warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "Accept failed");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let guard = self.tracker.track(Some(peer));
            let context = Arc::clone(&self.context);
            let signal = shutdown.subscribe();
            tokio::spawn(async move {
                let _permit = permit;
                let id = guard.id();
                let logger = context.connection_logger(id);
                let conn = Box::new(TcpConnection::new(stream, peer, logger));
                let end = context.serve(id, conn, signal).await;
                tracing::debug!(connection_id = %id, peer = %peer, reason = end.label(), "Session ended");
                // The drain completes on the guard; the registry must be free by then.
                drop(context);
                drop(guard);
            });
        }

        tracing::info!(
            active = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        drop(listener);
        self.shutdown().await;
        Ok(())
    }

    /// Wait for open connections (bounded by `timeouts.drain_secs`) and tear
    /// down the module registry.
    pub async fn shutdown(self) {
        if !self.tracker.wait_for_drain(self.drain_timeout).await {
            for (id, info) in self.tracker.snapshot() {
                tracing::warn!(
                    connection_id = %id,
                    peer = ?info.peer,
                    open_for_secs = info.opened_at.elapsed().as_secs(),
                    "Connection still open after drain timeout"
                );
            }
        }

        match Arc::try_unwrap(self.context) {
            Ok(context) => context.registry.shutdown(),
            Err(_) => tracing::warn!("Sessions still running; modules are released when the last one ends"),
        }
        tracing::info!("Server stopped");
    }
}
