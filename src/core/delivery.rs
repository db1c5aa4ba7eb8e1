//! # Result delivery onto a consumer's context.
//!
//! A consumer receives completions through [`TaskCompleted`]. The executor never
//! calls it directly from the worker; it posts a job onto the consumer's
//! [`DeliveryContext`], which decides where the callback runs.
//!
//! ```text
//! worker ──► ConsumerHandle::deliver(completion)
//!                 │ Weak<dyn TaskCompleted> (upgrade at run time)
//!                 ▼
//!           DeliveryContext
//!             ├─ Inline   → runs immediately, on the caller
//!             ├─ Spawn    → FIFO job queue drained by one tokio task
//!             └─ Channel  → FIFO job queue drained by the consumer's DeliveryLoop
//! ```
//!
//! ## Rules
//! - The executor holds only a weak reference; a dropped consumer is never kept alive.
//! - Jobs posted to one context run in posting order.
//! - A panicking callback is contained and logged; the context keeps running.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::core::panic_message;
use crate::error::TaskError;

/// Outcome of one task body.
pub type TaskResult = Result<(), TaskError>;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Completion target bound to an executor.
///
/// Called on the consumer's [`DeliveryContext`], at most once per task run.
pub trait TaskCompleted: Send + Sync + 'static {
    /// Receives the tag and result of a finished task.
    fn on_task_completed(&self, tag: &str, result: &TaskResult);
}

/// Result of a finished queued task, waiting to be delivered.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub tag: String,
    pub result: TaskResult,
}

/// Where completion callbacks run.
#[derive(Clone)]
pub struct DeliveryContext {
    kind: ContextKind,
}

#[derive(Clone)]
enum ContextKind {
    Inline,
    Queue(mpsc::UnboundedSender<Job>),
}

impl DeliveryContext {
    /// Runs callbacks immediately on the delivering side.
    ///
    /// For completions this is the executor worker while it holds the queue
    /// lock; callbacks must not block.
    pub fn inline() -> Self {
        Self {
            kind: ContextKind::Inline,
        }
    }

    /// Runs callbacks sequentially on a dedicated tokio task.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn() -> Self {
        let (ctx, mut rx) = Self::channel();
        tokio::spawn(async move {
            while rx.run_one().await {}
        });
        ctx
    }

    /// Returns a context whose callbacks run when the consumer drives the
    /// returned [`DeliveryLoop`].
    pub fn channel() -> (Self, DeliveryLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                kind: ContextKind::Queue(tx),
            },
            DeliveryLoop { rx },
        )
    }

    /// Returns `false` if the context can no longer run jobs.
    pub fn is_open(&self) -> bool {
        match &self.kind {
            ContextKind::Inline => true,
            ContextKind::Queue(tx) => !tx.is_closed(),
        }
    }

    fn dispatch(&self, job: Job) -> bool {
        match &self.kind {
            ContextKind::Inline => {
                run_job(job);
                true
            }
            ContextKind::Queue(tx) => tx.send(job).is_ok(),
        }
    }
}

impl std::fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ContextKind::Inline => "inline",
            ContextKind::Queue(_) => "queue",
        };
        f.debug_struct("DeliveryContext").field("kind", &kind).finish()
    }
}

/// Consumer-driven end of a [`DeliveryContext::channel`].
pub struct DeliveryLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl DeliveryLoop {
    /// Waits for the next callback and runs it.
    ///
    /// Returns `false` once every context handle has been dropped.
    pub async fn run_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                run_job(job);
                true
            }
            None => false,
        }
    }

    /// Runs every callback already posted, without waiting.
    pub fn run_pending(&mut self) -> usize {
        let mut n = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            n += 1;
        }
        n
    }

    /// Runs callbacks until every context handle has been dropped.
    pub async fn run(mut self) {
        while self.run_one().await {}
    }
}

fn run_job(job: Job) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
        tracing::warn!(panic = %panic_message(&*panic), "completion callback panicked");
    }
}

/// Binding between an executor and one consumer.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use taskhold::{ConsumerHandle, DeliveryContext, TaskCompleted, TaskResult};
///
/// struct Screen;
/// impl TaskCompleted for Screen {
///     fn on_task_completed(&self, tag: &str, result: &TaskResult) {
///         println!("{tag}: {}", result.is_ok());
///     }
/// }
///
/// let screen = Arc::new(Screen);
/// let handle = ConsumerHandle::new(&screen, DeliveryContext::inline());
/// assert!(handle.is_alive());
/// drop(screen);
/// assert!(!handle.is_alive());
/// ```
#[derive(Clone)]
pub struct ConsumerHandle {
    consumer: Weak<dyn TaskCompleted>,
    context: DeliveryContext,
}

impl ConsumerHandle {
    /// Binds `consumer` with callbacks running on `context`.
    pub fn new<C: TaskCompleted>(consumer: &Arc<C>, context: DeliveryContext) -> Self {
        let weak: Weak<C> = Arc::downgrade(consumer);
        Self {
            consumer: weak,
            context,
        }
    }

    /// Binds `consumer` with inline callbacks.
    pub fn inline<C: TaskCompleted>(consumer: &Arc<C>) -> Self {
        Self::new(consumer, DeliveryContext::inline())
    }

    /// Returns `true` while the consumer exists and its context accepts jobs.
    pub fn is_alive(&self) -> bool {
        self.consumer.strong_count() > 0 && self.context.is_open()
    }

    pub fn context(&self) -> &DeliveryContext {
        &self.context
    }

    /// Posts `completion` to the consumer's context.
    ///
    /// Returns `false` if the consumer is gone or its context is closed.
    pub(crate) fn deliver(&self, completion: Completion) -> bool {
        if !self.is_alive() {
            return false;
        }
        let consumer = self.consumer.clone();
        self.context.dispatch(Box::new(move || {
            if let Some(consumer) = consumer.upgrade() {
                consumer.on_task_completed(&completion.tag, &completion.result);
            }
        }))
    }
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("alive", &self.is_alive())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl TaskCompleted for Recorder {
        fn on_task_completed(&self, tag: &str, result: &TaskResult) {
            self.seen.lock().unwrap().push((tag.to_string(), result.is_ok()));
        }
    }

    fn done(tag: &str, ok: bool) -> Completion {
        Completion {
            tag: tag.into(),
            result: if ok { Ok(()) } else { Err(TaskError::fail("x")) },
        }
    }

    #[test]
    fn test_inline_runs_immediately() {
        let rec = Arc::new(Recorder::default());
        let handle = ConsumerHandle::inline(&rec);
        assert!(handle.deliver(done("a", true)));
        assert_eq!(rec.seen.lock().unwrap().as_slice(), &[("a".to_string(), true)]);
    }

    #[test]
    fn test_channel_runs_in_order_when_driven() {
        let rec = Arc::new(Recorder::default());
        let (ctx, mut lp) = DeliveryContext::channel();
        let handle = ConsumerHandle::new(&rec, ctx);

        handle.deliver(done("a", true));
        handle.deliver(done("b", false));
        assert!(rec.seen.lock().unwrap().is_empty());

        assert_eq!(lp.run_pending(), 2);
        assert_eq!(
            rec.seen.lock().unwrap().as_slice(),
            &[("a".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[test]
    fn test_dropped_consumer_is_not_delivered() {
        let rec = Arc::new(Recorder::default());
        let handle = ConsumerHandle::inline(&rec);
        drop(rec);
        assert!(!handle.is_alive());
        assert!(!handle.deliver(done("a", true)));
    }

    #[test]
    fn test_closed_loop_rejects_delivery() {
        let rec = Arc::new(Recorder::default());
        let (ctx, lp) = DeliveryContext::channel();
        let handle = ConsumerHandle::new(&rec, ctx);
        drop(lp);
        assert!(!handle.is_alive());
        assert!(!handle.deliver(done("a", true)));
    }

    #[tokio::test]
    async fn test_spawned_context_survives_panicking_callback() {
        struct Boom;
        impl TaskCompleted for Boom {
            fn on_task_completed(&self, _tag: &str, _result: &TaskResult) {
                panic!("boom");
            }
        }

        let ctx = DeliveryContext::spawn();
        let boom = Arc::new(Boom);
        let rec = Arc::new(Recorder::default());
        ConsumerHandle::new(&boom, ctx.clone()).deliver(done("a", true));
        ConsumerHandle::new(&rec, ctx).deliver(done("b", true));

        for _ in 0..100 {
            if !rec.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(rec.seen.lock().unwrap().as_slice(), &[("b".to_string(), true)]);
    }
}
