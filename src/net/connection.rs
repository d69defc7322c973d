//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Keep a live table of open connections (peer, age)
//! - Let shutdown wait for every connection to close, with a deadline
//! - Collect per-connection metrics

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the tracker knows about an open connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote address; `None` for in-memory connections.
    pub peer: Option<SocketAddr>,
    pub opened_at: Instant,
}

#[derive(Debug, Default)]
struct TrackerInner {
    live: DashMap<ConnectionId, ConnectionInfo>,
    closed: Notify,
}

/// Tracks open connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new open connection. Returns a guard that removes it on drop.
    pub fn track(&self, peer: Option<SocketAddr>) -> ConnectionGuard {
        let id = ConnectionId::new();
        self.inner.live.insert(
            id,
            ConnectionInfo {
                peer,
                opened_at: Instant::now(),
            },
        );
        metrics::record_connection_opened();
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Get current open connection count.
    pub fn active_count(&self) -> usize {
        self.inner.live.len()
    }

    /// Open connections at this moment.
    pub fn snapshot(&self) -> Vec<(ConnectionId, ConnectionInfo)> {
        self.inner
            .live
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Wait until every connection has closed. Returns `false` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let closed = self.inner.closed.notified();
            tokio::pin!(closed);
            // Register interest before checking, so a close in between is not missed.
            closed.as_mut().enable();
            if self.inner.live.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, closed).await.is_err() {
                return self.inner.live.is_empty();
            }
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Removes the connection from the live table when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some((_, info)) = self.inner.live.remove(&self.id) {
            tracing::trace!(
                connection_id = %self.id,
                open_for_ms = info.opened_at.elapsed().as_millis() as u64,
                "Connection closed"
            );
        }
        metrics::record_connection_closed();
        self.inner.closed.notify_waiters();
    }
}
