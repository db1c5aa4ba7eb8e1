//! # Run a single task body.
//!
//! Executes one body to completion and converts a panic into
//! [`TaskError::Panicked`], so a misbehaving task can never take the worker down.
//!
//! ## Rules
//! - Bodies are awaited to completion; there is no hard cancellation.
//! - Exactly one result is produced per call.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::core::panic_message;
use crate::error::TaskError;
use crate::tasks::TaskSpec;

/// Awaits `fut`, containing panics.
pub(crate) async fn run_guarded<T, F>(fut: F) -> Result<T, TaskError>
where
    F: Future<Output = Result<T, TaskError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(TaskError::Panicked {
            info: panic_message(&*panic),
        }),
    }
}

/// Executes the body of a queued task with its parameters.
pub(crate) async fn run_once(spec: &TaskSpec) -> Result<(), TaskError> {
    run_guarded(spec.task().execute(spec.params())).await
}
