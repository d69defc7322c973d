//! Timeout enforcement for module invocations.
//!
//! # Responsibilities
//! - Run a synchronous module call off the async workers
//! - Abandon the call when it exceeds its deadline
//! - Turn panics and timeouts into a distinct, loggable error
//!
//! # Design Decisions
//! - Calls run on tokio's blocking pool, so a stuck module never stalls I/O
//! - A timed-out call cannot be killed; it is detached and its result dropped
//! - Timeout errors are distinct from module-reported failures

use std::time::Duration;

use thiserror::Error;

use crate::resilience::isolation::panic_message;

/// Why a guarded invocation produced no value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    /// The call exceeded its deadline and was abandoned.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The call panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The runtime cancelled the call before it completed.
    #[error("cancelled before completion")]
    Cancelled,
}

/// Run `call` on the blocking pool and wait at most `timeout` for it.
pub async fn invoke_guarded<T, F>(timeout: Duration, call: F) -> Result<T, InvocationError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) if join_error.is_panic() => Err(InvocationError::Panicked(
            panic_message(&*join_error.into_panic()),
        )),
        Ok(Err(_)) => Err(InvocationError::Cancelled),
        Err(_) => Err(InvocationError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value() {
        let value = invoke_guarded(Duration::from_secs(1), || 41 + 1).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn panic_is_captured() {
        let result: Result<(), _> =
            invoke_guarded(Duration::from_secs(1), || panic!("handler exploded")).await;
        assert_eq!(
            result,
            Err(InvocationError::Panicked("handler exploded".to_string()))
        );
    }

    #[tokio::test]
    async fn stuck_call_is_abandoned() {
        let started = std::time::Instant::now();
        let result = invoke_guarded(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_millis(400));
        })
        .await;

        assert_eq!(
            result,
            Err(InvocationError::TimedOut(Duration::from_millis(50)))
        );
        assert!(started.elapsed() < Duration::from_millis(300));
    }
}
