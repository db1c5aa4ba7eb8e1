//! # Removal policy for completed tasks.
//!
//! [`RemovalPolicy`] decides whether a task leaves the queue once its body finishes.
//!
//! - `on_success`: remove after the body returned `Ok(())`.
//! - `on_exception`: remove after the body returned an error or panicked.
//!
//! A task that is not removed stays queued in its terminal state; the next
//! `execute_queue` runs it again, which is how consumers retry work.
//!
//! ## Choosing the right policy
//! ```text
//! RemovalPolicy::default()   → success removes, failure stays queued for retry
//! RemovalPolicy::always()    → fire-and-forget: removed whatever the outcome
//! RemovalPolicy::never()     → stays until explicitly cancelled
//! ```

use crate::error::TaskError;

const FLAG_ON_SUCCESS: u8 = 0b01;
const FLAG_ON_EXCEPTION: u8 = 0b10;

/// Policy controlling whether a finished task is removed from the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalPolicy {
    /// Remove the task after a successful run.
    pub on_success: bool,
    /// Remove the task after a failed run.
    pub on_exception: bool,
}

impl Default for RemovalPolicy {
    /// Returns `on_success = true`, `on_exception = false`.
    fn default() -> Self {
        Self {
            on_success: true,
            on_exception: false,
        }
    }
}

impl RemovalPolicy {
    pub fn new(on_success: bool, on_exception: bool) -> Self {
        Self {
            on_success,
            on_exception,
        }
    }

    /// Removes the task whatever the outcome.
    pub fn always() -> Self {
        Self::new(true, true)
    }

    /// Keeps the task queued whatever the outcome.
    pub fn never() -> Self {
        Self::new(false, false)
    }

    /// Evaluates the policy against a terminal outcome.
    ///
    /// Returns `true` for `(Ok ∧ on_success) ∨ (Err ∧ on_exception)`.
    pub fn should_remove(&self, outcome: &Result<(), TaskError>) -> bool {
        match outcome {
            Ok(()) => self.on_success,
            Err(_) => self.on_exception,
        }
    }

    pub(crate) fn to_flags(self) -> u8 {
        let mut flags = 0;
        if self.on_success {
            flags |= FLAG_ON_SUCCESS;
        }
        if self.on_exception {
            flags |= FLAG_ON_EXCEPTION;
        }
        flags
    }

    pub(crate) fn from_flags(flags: u8) -> Self {
        Self {
            on_success: flags & FLAG_ON_SUCCESS != 0,
            on_exception: flags & FLAG_ON_EXCEPTION != 0,
        }
    }
}
