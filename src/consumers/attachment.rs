//! # Consumer lifecycle helper.
//!
//! [`Attachment`] wires a consumer's resume/pause lifecycle to the host's executor:
//!
//! ```text
//! resume() ──► request_reference(mode)
//!                ├─ on_reference_ready → attach_callback(consumer)   (held result delivered)
//!                └─ on_tasks_restored  → execute_queue()             (if auto_execute_after_restore)
//!
//! pause()  ──► allow_finess ? restrain() : detach_callback()
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::config::Mode;
use crate::core::{
    ConsumerHandle, DeliveryContext, ExecutorHost, ReferenceReady, TaskCompleted, TaskExecutor,
    TasksRestored,
};
use crate::error::PersistenceError;

/// Behaviour of an [`Attachment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentOptions {
    /// Mode requested for the executor.
    pub mode: Mode,
    /// Restrain instead of detach on pause, so a result produced while paused
    /// is held and delivered on the next resume.
    pub allow_finess: bool,
    /// Start draining as soon as a previous run's tasks are restored.
    pub auto_execute_after_restore: bool,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            mode: Mode::CallbackDependent,
            allow_finess: true,
            auto_execute_after_restore: false,
        }
    }
}

/// Binds one consumer to the host's executor across pause/resume cycles.
pub struct Attachment<C: TaskCompleted> {
    host: Arc<ExecutorHost>,
    consumer: Arc<C>,
    context: DeliveryContext,
    options: AttachmentOptions,
    executor: OnceCell<Arc<TaskExecutor>>,
}

impl<C: TaskCompleted> Attachment<C> {
    pub fn new(
        host: Arc<ExecutorHost>,
        consumer: Arc<C>,
        context: DeliveryContext,
        options: AttachmentOptions,
    ) -> Self {
        Self {
            host,
            consumer,
            context,
            options,
            executor: OnceCell::new(),
        }
    }

    pub fn consumer(&self) -> &Arc<C> {
        &self.consumer
    }

    pub fn options(&self) -> AttachmentOptions {
        self.options
    }

    /// Executor obtained by the last [`Attachment::resume`], if any.
    pub fn executor(&self) -> Option<Arc<TaskExecutor>> {
        self.executor.get().cloned()
    }

    /// Requests the executor and attaches the consumer.
    pub async fn resume(&self) -> Result<Arc<TaskExecutor>, PersistenceError> {
        self.host
            .request_reference(self.options.mode, self, Some(self))
            .await
    }

    /// Restrains (with finess) or detaches the consumer.
    pub async fn pause(&self) {
        let Some(exec) = self.executor.get() else {
            return;
        };
        if self.options.allow_finess {
            exec.restrain().await;
        } else {
            exec.detach_callback().await;
        }
    }
}

#[async_trait]
impl<C: TaskCompleted> ReferenceReady for Attachment<C> {
    async fn on_reference_ready(&self, executor: Arc<TaskExecutor>) {
        let _ = self.executor.set(Arc::clone(&executor));
        executor
            .attach_callback(ConsumerHandle::new(&self.consumer, self.context.clone()))
            .await;
    }
}

#[async_trait]
impl<C: TaskCompleted> TasksRestored for Attachment<C> {
    async fn on_tasks_restored(&self) {
        if !self.options.auto_execute_after_restore {
            return;
        }
        if let Some(exec) = self.executor.get() {
            let n = exec.execute_queue().await;
            tracing::debug!(scheduled = n, "restored tasks scheduled");
        }
    }
}
