//! Panic isolation for fire-and-forget module calls.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `call`, converting a panic into its message.
///
/// Module instances are shared behind `Arc`; a panic inside one leaves it in
/// whatever state the module left it, which is the module's concern.
pub fn run_isolated<T>(call: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(call)).map_err(|payload| panic_message(&*payload))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
