//! # Task abstraction.
//!
//! This module defines the [`Task`] trait: the executable body of a queued unit
//! of work. The common handle type is [`TaskRef`], an `Arc<dyn Task>` suitable
//! for sharing between the queue, the registry and the worker.
//!
//! A body receives the task's parameter [`Bundle`]; everything it needs to
//! resume after a process restart must live there, because on restore a fresh
//! instance is produced by the registered zero-argument factory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::Bundle;

/// # Executable body of a queued task.
///
/// Runs to completion once started; the executor never interrupts it.
/// A body that never returns blocks the whole queue.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use taskhold::{Bundle, Task, TaskError};
///
/// #[derive(Default)]
/// struct Upload;
///
/// #[async_trait]
/// impl Task for Upload {
///     async fn execute(&self, params: &Bundle) -> Result<(), TaskError> {
///         let path = params.get_str("path").ok_or_else(|| TaskError::fail("missing path"))?;
///         // upload `path`...
///         let _ = path;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Performs the work described by `params`.
    async fn execute(&self, params: &Bundle) -> Result<(), TaskError>;
}

/// Shared handle to a task body.
pub type TaskRef = Arc<dyn Task>;
