//! # Process-wide executor host.
//!
//! [`ExecutorHost`] owns the single [`TaskExecutor`] of a process, creates it
//! lazily on the first reference request and restores the queue directory on
//! that cold start.
//!
//! ## Architecture
//! ```text
//! request_reference(mode, ready, restored?)
//!   ├─ first call (cold start, init-once):
//!   │     QueueStore::restore() ──► TaskExecutor::start(mode)
//!   │        ├─ skipped records ──► RecordSkipped
//!   │        └─ tasks ──► set_queue() ──► QueueRestored (if any)
//!   ├─ ready.on_reference_ready(executor)
//!   └─ restored.on_tasks_restored()   (once per process, first requester that asks)
//!
//! Bus ──► listener ──► SubscriberSet::emit(&Event)
//!
//! shutdown():
//!   executor.shutdown() ──► executor.synchronize() ──► cancel listener
//!     ──► listener drains the bus ──► SubscriberSet::shutdown() (workers drain)
//! ```
//!
//! ## Rules
//! - Exactly one executor per host; concurrent first requests restore once.
//! - The mode of the first request wins; later differing modes are logged.
//! - A failed restore leaves the host uninitialised; the next request retries.
//! - Events published before `shutdown` returns reach every subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Mode};
use crate::core::builder::HostBuilder;
use crate::core::executor::TaskExecutor;
use crate::error::PersistenceError;
use crate::events::{Bus, Event, EventKind};
use crate::persistence::{QueueStore, TaskRegistry};
use crate::subscribers::SubscriberSet;

/// Receives the executor reference after a successful request.
#[async_trait]
pub trait ReferenceReady: Send + Sync {
    async fn on_reference_ready(&self, executor: Arc<TaskExecutor>);
}

/// Notified once per process that tasks from a previous run were restored.
#[async_trait]
pub trait TasksRestored: Send + Sync {
    async fn on_tasks_restored(&self);
}

/// Owner of the process's executor.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use taskhold::{Config, ExecutorHost, Mode, ReferenceReady, TaskExecutor};
///
/// struct Screen;
///
/// #[async_trait]
/// impl ReferenceReady for Screen {
///     async fn on_reference_ready(&self, executor: Arc<TaskExecutor>) {
///         assert_eq!(executor.mode(), Mode::CallbackDependent);
///     }
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let dir = std::env::temp_dir().join("taskhold-doc-host");
///     let host = ExecutorHost::builder(Config::with_root(&dir)).build();
///
///     let exec = host
///         .request_reference(Mode::CallbackDependent, &Screen, None)
///         .await
///         .unwrap();
///     assert!(Arc::ptr_eq(&exec, &host.executor().unwrap()));
///     host.shutdown().await.unwrap();
/// }
/// ```
pub struct ExecutorHost {
    cfg: Config,
    bus: Bus,
    listener: Mutex<Option<JoinHandle<()>>>,
    store: Arc<QueueStore>,
    executor: OnceCell<Arc<TaskExecutor>>,
    restored: AtomicUsize,
    restore_pending: AtomicBool,
    token: CancellationToken,
}

impl ExecutorHost {
    /// Returns a builder for a host with the given configuration.
    pub fn builder(cfg: Config) -> HostBuilder {
        HostBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        registry: Arc<TaskRegistry>,
    ) -> Arc<Self> {
        let store = Arc::new(QueueStore::new(cfg.queue_dir.clone(), registry));
        let token = CancellationToken::new();
        let listener = subscriber_listener(&bus, subs, token.clone());
        Arc::new(Self {
            cfg,
            bus,
            listener: Mutex::new(listener),
            store,
            executor: OnceCell::new(),
            restored: AtomicUsize::new(0),
            restore_pending: AtomicBool::new(false),
            token,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        self.store.registry()
    }

    /// Returns the executor if it was already created.
    pub fn executor(&self) -> Option<Arc<TaskExecutor>> {
        self.executor.get().cloned()
    }

    /// Number of tasks restored on cold start.
    pub fn restored_count(&self) -> usize {
        self.restored.load(Ordering::Acquire)
    }

    /// Returns the executor, creating and restoring it on the first call.
    ///
    /// `ready` is always invoked with the executor. `restored` is invoked once
    /// per process, on the first request that supplies it after a cold start
    /// restored at least one task.
    ///
    /// # Errors
    /// Returns the restore failure of a cold start; the host stays
    /// uninitialised and the next request retries.
    pub async fn request_reference(
        &self,
        mode: Mode,
        ready: &dyn ReferenceReady,
        restored: Option<&dyn TasksRestored>,
    ) -> Result<Arc<TaskExecutor>, PersistenceError> {
        let exec = self
            .executor
            .get_or_try_init(|| self.cold_start(mode))
            .await?;

        if exec.mode() != mode {
            tracing::warn!(
                requested = mode.as_label(),
                active = exec.mode().as_label(),
                "executor already created with a different mode"
            );
        }

        let exec = Arc::clone(exec);
        ready.on_reference_ready(Arc::clone(&exec)).await;

        if let Some(cb) = restored {
            if self.restore_pending.swap(false, Ordering::AcqRel) {
                cb.on_tasks_restored().await;
            }
        }
        Ok(exec)
    }

    /// Stops the executor worker, reconciles the queue directory one last time
    /// and waits for subscribers to process every event published so far.
    pub async fn shutdown(&self) -> Result<(), PersistenceError> {
        let res = match self.executor.get() {
            Some(exec) => {
                exec.shutdown();
                exec.synchronize().await.map(|_| ())
            }
            None => Ok(()),
        };
        self.token.cancel();

        if let Some(listener) = self.listener.lock().await.take() {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "subscriber listener failed");
            }
        }
        res
    }

    async fn cold_start(&self, mode: Mode) -> Result<Arc<TaskExecutor>, PersistenceError> {
        let restored = match self.store.restore().await {
            Ok(restored) => restored,
            Err(e) => {
                tracing::error!(error = %e, dir = %self.cfg.queue_dir.display(), "queue restore failed");
                self.bus
                    .publish(Event::new(EventKind::PersistFailed).with_reason(e.to_string()));
                return Err(e);
            }
        };

        for (file, err) in &restored.skipped {
            self.bus.publish(
                Event::new(EventKind::RecordSkipped)
                    .with_tag(file.as_str())
                    .with_reason(err.to_string()),
            );
        }

        let exec = TaskExecutor::start(
            mode,
            self.bus.clone(),
            Some(Arc::clone(&self.store)),
            Arc::clone(self.store.registry()),
            self.cfg.sync_on_change,
            self.token.child_token(),
        );

        let count = exec.set_queue(restored.tasks).await.unwrap_or_default();
        tracing::info!(count, mode = mode.as_label(), "executor created");
        if count > 0 {
            self.restored.store(count, Ordering::Release);
            self.restore_pending.store(true, Ordering::Release);
            self.bus
                .publish(Event::new(EventKind::QueueRestored).with_count(count));
        }
        Ok(exec)
    }
}

/// Forwards bus events to `set` until `token` is cancelled, then drains the
/// bus and shuts the set down.
///
/// Returns `None` (and spawns nothing) when there are no subscribers.
fn subscriber_listener(
    bus: &Bus,
    set: SubscriberSet,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if set.is_empty() {
        return None;
    }
    let mut rx = bus.subscribe();
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        // Drain what was published before cancellation.
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bundle, TaskError, TaskFn, TaskRef, TaskSpec};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counter {
        ready: AtomicUsize,
        restored: AtomicUsize,
    }

    #[async_trait]
    impl ReferenceReady for Counter {
        async fn on_reference_ready(&self, _executor: Arc<TaskExecutor>) {
            self.ready.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TasksRestored for Counter {
        async fn on_tasks_restored(&self) {
            self.restored.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new().with("Noop", || {
            TaskFn::arc(|_p: Bundle| async { Ok::<_, TaskError>(()) }) as TaskRef
        })
    }

    fn host(dir: &TempDir) -> Arc<ExecutorHost> {
        ExecutorHost::builder(Config::with_root(dir.path()))
            .with_registry(registry())
            .build()
    }

    #[tokio::test]
    async fn test_single_executor_per_host() {
        let tmp = TempDir::new().unwrap();
        let host = host(&tmp);
        let c = Counter::default();

        let a = host
            .request_reference(Mode::CallbackDependent, &c, None)
            .await
            .unwrap();
        let b = host
            .request_reference(Mode::CallbackInconsiderate, &c, None)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.mode(), Mode::CallbackDependent);
        assert_eq!(c.ready.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restored_notice_fires_once() {
        let tmp = TempDir::new().unwrap();
        {
            let first = host(&tmp);
            let exec = first
                .request_reference(Mode::CallbackInconsiderate, &Counter::default(), None)
                .await
                .unwrap();
            exec.submit_named("a", "Noop", Bundle::new(), Default::default())
                .await
                .unwrap();
            first.shutdown().await.unwrap();
        }

        let second = host(&tmp);
        let loader = Counter::default();
        let screen = Counter::default();

        second
            .request_reference(Mode::CallbackInconsiderate, &loader, None)
            .await
            .unwrap();
        assert_eq!(second.restored_count(), 1);

        for _ in 0..2 {
            second
                .request_reference(Mode::CallbackInconsiderate, &screen, Some(&screen))
                .await
                .unwrap();
        }
        assert_eq!(loader.restored.load(Ordering::SeqCst), 0);
        assert_eq!(screen.restored.load(Ordering::SeqCst), 1);

        let queue = second.executor().unwrap().get_queue().await;
        assert_eq!(queue.iter().map(TaskSpec::tag).collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_subscribers() {
        struct Slow(std::sync::Mutex<Vec<EventKind>>);

        #[async_trait]
        impl crate::Subscribe for Slow {
            async fn on_event(&self, event: &Event) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                self.0.lock().unwrap().push(event.kind);
            }
        }

        let tmp = TempDir::new().unwrap();
        let slow = Arc::new(Slow(std::sync::Mutex::new(Vec::new())));
        let host = ExecutorHost::builder(Config::with_root(tmp.path()))
            .with_registry(registry())
            .with_subscribers(vec![slow.clone() as Arc<dyn crate::Subscribe>])
            .build();

        let exec = host
            .request_reference(Mode::CallbackInconsiderate, &Counter::default(), None)
            .await
            .unwrap();
        for tag in ["a", "b", "c"] {
            exec.submit_named(tag, "Noop", Bundle::new(), Default::default())
                .await
                .unwrap();
        }
        host.shutdown().await.unwrap();

        let seen = slow.0.lock().unwrap().clone();
        let submitted = seen
            .iter()
            .filter(|k| **k == EventKind::TaskSubmitted)
            .count();
        assert_eq!(submitted, 3);
        assert_eq!(
            seen.iter()
                .filter(|k| **k == EventKind::QueueSynchronized)
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_failed_restore_leaves_host_uninitialised() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let host = ExecutorHost::builder(Config::with_root(&blocker)).build();
        let res = host
            .request_reference(Mode::CallbackInconsiderate, &Counter::default(), None)
            .await;
        assert!(res.is_err());
        assert!(host.executor().is_none());
    }
}
