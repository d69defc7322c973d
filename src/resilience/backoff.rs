//! Exponential backoff with jitter.
//!
//! Used for write retries under backpressure and for idle polling of
//! connections whose parser pulled no bytes.

use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` starts at 1; attempt 0 yields no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Jitter: 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Stateful backoff for poll loops: grows while idle, resets on activity.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            attempt: 0,
            base_ms,
            max_ms: max_ms.max(base_ms),
        }
    }

    /// Delay before the next poll.
    pub fn next_delay(&mut self) -> Duration {
        // Past 32 doublings every delay is capped anyway.
        self.attempt = (self.attempt + 1).min(32);
        calculate_backoff(self.attempt, self.base_ms, self.max_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() < 1100);
    }

    #[test]
    fn poll_backoff_grows_and_resets() {
        let mut backoff = Backoff::new(2, 16);
        let first = backoff.next_delay();
        for _ in 0..10 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay();
        assert!(first.as_millis() >= 2 && first.as_millis() < 4);
        assert!(capped.as_millis() >= 16);

        backoff.reset();
        assert!(backoff.next_delay().as_millis() < 4);
    }
}
