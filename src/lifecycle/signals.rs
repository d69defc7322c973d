//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Trigger graceful shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second signal during drain forces exit

use crate::lifecycle::shutdown::Shutdown;

/// Wait for a termination signal and trigger `shutdown`.
///
/// A second signal exits the process immediately.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    wait_for_signal().await;
    tracing::info!("Shutdown signal received, draining connections");
    shutdown.trigger();

    wait_for_signal().await;
    tracing::warn!("Second shutdown signal received, exiting immediately");
    std::process::exit(130);
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
