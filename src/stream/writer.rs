//! Serialized response writing over a non-blocking stream.
//!
//! # Responsibilities
//! - Push a whole payload through `Output::write`, resuming partial writes
//! - Back off while the stream accepts nothing
//! - Give up after a bounded window instead of waiting forever

use std::time::Duration;

use tokio::time::Instant;

use crate::resilience::backoff::calculate_backoff;
use crate::stream::{Connection, StreamError};

/// Retry policy for writes that hit backpressure.
#[derive(Debug, Clone, Copy)]
pub struct WritePolicy {
    /// Total time a single payload may wait for write availability.
    pub timeout: Duration,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

/// Write all of `bytes` to `conn`.
///
/// Every accepted chunk resets the backoff; the timeout covers the time spent
/// without progress, so a slow reader is tolerated but a dead one is not.
pub async fn write_all(
    conn: &mut dyn Connection,
    bytes: &[u8],
    policy: &WritePolicy,
) -> Result<(), StreamError> {
    let mut offset = 0;
    let mut attempt = 0u32;
    let mut stalled_since = Instant::now();

    while offset < bytes.len() {
        let accepted = conn.write(&bytes[offset..])?;
        if accepted > 0 {
            offset += accepted.min(bytes.len() - offset);
            attempt = 0;
            stalled_since = Instant::now();
            continue;
        }

        let waited = stalled_since.elapsed();
        if waited >= policy.timeout {
            return Err(StreamError::WriteTimeout {
                waited,
                remaining: bytes.len() - offset,
            });
        }

        attempt = attempt.saturating_add(1);
        let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms)
            .min(policy.timeout - waited);
        tokio::time::sleep(delay).await;
    }

    Ok(())
}
