//! # Persistent sequential task executor.
//!
//! [`TaskExecutor`] owns the ordered queue, a single worker that drains it one
//! task at a time, and the binding to at most one consumer.
//!
//! ## Architecture
//! ```text
//! submit(spec) ──► queue[Pending] ──► store.synchronize()
//!
//! execute_queue() ──► run_list += queued tags ──► wake ──► worker
//!
//! worker (one tokio task):
//!   loop {
//!     wait(wake | cancelled)
//!     drain:
//!       ├─ restrained            → run transient jobs only, queued tasks pause
//!       │                          (until attach_callback / release)
//!       ├─ Transient(job)        → run, answer through its oneshot
//!       └─ Queued(tag)
//!            ├─ dependent & no consumer → drop queued jobs from run list
//!            ├─ tag no longer queued    → skip
//!            └─ Running → run_once(spec) → complete():
//!                  ├─ Succeeded / Failed
//!                  ├─ RemovalPolicy → remove + synchronize
//!                  └─ result:
//!                       ├─ restrained     → held (ResultWithheld), pause
//!                       ├─ live consumer  → DeliveryContext (ResultDelivered)
//!                       └─ otherwise      → ResultDiscarded
//!   }
//! ```
//!
//! ## Rules
//! - At most one task body runs at a time; queued tasks start in submission order.
//! - Queue state and the consumer binding are guarded by one async mutex; every
//!   operation observes a state before or after a completion, never in between.
//! - A result is delivered at most once, to the consumer bound when it was produced
//!   or to the first consumer attached after a restrain.
//! - Bodies run outside the lock; completion bookkeeping runs inside it.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::Mode;
use crate::core::delivery::{Completion, ConsumerHandle, TaskResult};
use crate::core::runner;
use crate::error::{PersistenceError, QueueError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::persistence::{QueueStore, SyncReport, TaskRegistry, validate_tag};
use crate::policies::RemovalPolicy;
use crate::tasks::{Bundle, TaskSpec};

/// Lifecycle state of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, not running.
    Pending,
    /// Body currently executing on the worker.
    Running,
    /// Last run returned `Ok` and the task was retained.
    Succeeded,
    /// Last run failed and the task was retained.
    Failed,
}

struct Entry {
    id: u64,
    spec: TaskSpec,
    state: TaskState,
}

enum Job {
    Queued(String),
    Transient(BoxFuture<'static, ()>),
}

enum Ready {
    Queued(u64, TaskSpec),
    Transient(BoxFuture<'static, ()>),
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Entry>,
    run_list: VecDeque<Job>,
    consumer: Option<ConsumerHandle>,
    restrained: bool,
    held: Option<Completion>,
    running: Option<u64>,
    started: bool,
    next_id: u64,
}

impl QueueState {
    fn has_live_consumer(&self) -> bool {
        self.consumer.as_ref().is_some_and(ConsumerHandle::is_alive)
    }

    fn position(&self, tag: &str) -> Option<usize> {
        self.queue.iter().position(|e| e.spec.tag() == tag)
    }

    fn is_scheduled(&self, tag: &str) -> bool {
        self.run_list
            .iter()
            .any(|j| matches!(j, Job::Queued(t) if t == tag))
    }

    fn push(&mut self, spec: TaskSpec) {
        self.next_id += 1;
        self.queue.push(Entry {
            id: self.next_id,
            spec,
            state: TaskState::Pending,
        });
    }

    fn snapshot(&self) -> Vec<TaskSpec> {
        self.queue.iter().map(|e| e.spec.clone()).collect()
    }
}

/// Persistent, sequential, single-worker task queue.
///
/// Created by an [`ExecutorHost`](crate::ExecutorHost) for persistent use, or
/// standalone with [`TaskExecutor::in_memory`] / [`TaskExecutor::persistent`].
/// All constructors spawn the worker and must be called within a tokio runtime.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use taskhold::{Bundle, ConsumerHandle, Mode, TaskCompleted, TaskError,
///     TaskExecutor, TaskFn, TaskResult, TaskSpec};
///
/// struct Screen(tokio::sync::mpsc::UnboundedSender<String>);
/// impl TaskCompleted for Screen {
///     fn on_task_completed(&self, tag: &str, _result: &TaskResult) {
///         let _ = self.0.send(tag.to_string());
///     }
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
///     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
///     let screen = Arc::new(Screen(tx));
///     exec.attach_callback(ConsumerHandle::inline(&screen)).await;
///
///     let body = TaskFn::arc(|_p: Bundle| async { Ok::<_, TaskError>(()) });
///     exec.submit(TaskSpec::new("hello", "Hello", body)).await.unwrap();
///     exec.execute_queue().await;
///
///     assert_eq!(rx.recv().await.as_deref(), Some("hello"));
///     assert!(exec.is_empty().await);
/// }
/// ```
pub struct TaskExecutor {
    mode: Mode,
    state: Mutex<QueueState>,
    store: Option<Arc<QueueStore>>,
    registry: Arc<TaskRegistry>,
    sync_on_change: bool,
    bus: Bus,
    wake: Arc<Notify>,
    token: CancellationToken,
}

impl TaskExecutor {
    /// Creates an executor without disk persistence and with an empty registry.
    pub fn in_memory(mode: Mode) -> Arc<Self> {
        Self::start(
            mode,
            Bus::new(1024),
            None,
            Arc::new(TaskRegistry::new()),
            false,
            CancellationToken::new(),
        )
    }

    /// Creates an executor mirroring its queue into `store` after every change.
    ///
    /// The queue starts empty; use [`TaskExecutor::set_queue`] with the result
    /// of [`QueueStore::restore`] to resume a previous run.
    pub fn persistent(mode: Mode, store: Arc<QueueStore>) -> Arc<Self> {
        let registry = Arc::clone(store.registry());
        Self::start(
            mode,
            Bus::new(1024),
            Some(store),
            registry,
            true,
            CancellationToken::new(),
        )
    }

    pub(crate) fn start(
        mode: Mode,
        bus: Bus,
        store: Option<Arc<QueueStore>>,
        registry: Arc<TaskRegistry>,
        sync_on_change: bool,
        token: CancellationToken,
    ) -> Arc<Self> {
        let exec = Arc::new(Self {
            mode,
            state: Mutex::new(QueueState::default()),
            store,
            registry,
            sync_on_change,
            bus,
            wake: Arc::new(Notify::new()),
            token,
        });
        tokio::spawn(worker(
            Arc::downgrade(&exec),
            Arc::clone(&exec.wake),
            exec.token.clone(),
        ));
        exec
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Event bus this executor publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Returns `true` once [`TaskExecutor::shutdown`] was called.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    // ---------------------------
    // Queue mutation
    // ---------------------------

    /// Appends `spec` to the queue in `Pending` state.
    ///
    /// Does not start execution; see [`TaskExecutor::execute_queue`].
    ///
    /// # Errors
    /// - [`QueueError::ExecutorClosed`] after shutdown
    /// - [`QueueError::InvalidTag`] if the tag cannot be used as a file name
    /// - [`QueueError::DuplicateTag`] if a task with the same tag is queued
    pub async fn submit(&self, spec: TaskSpec) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::ExecutorClosed);
        }
        validate_tag(spec.tag()).map_err(|reason| QueueError::InvalidTag {
            tag: spec.tag().to_string(),
            reason,
        })?;

        let mut st = self.state.lock().await;
        if st.position(spec.tag()).is_some() {
            return Err(QueueError::DuplicateTag {
                tag: spec.tag().to_string(),
            });
        }

        self.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_tag(spec.tag())
                .with_type_name(spec.type_name()),
        );
        st.push(spec);
        self.persist_locked(st.snapshot()).await;
        Ok(())
    }

    /// Builds a task through the registry and submits it.
    ///
    /// # Errors
    /// [`QueueError::UnregisteredType`] if `type_name` is unknown, otherwise as
    /// [`TaskExecutor::submit`].
    pub async fn submit_named(
        &self,
        tag: impl Into<String>,
        type_name: &str,
        params: Bundle,
        removal: RemovalPolicy,
    ) -> Result<(), QueueError> {
        let spec = TaskSpec::from_registry(tag, type_name, &self.registry)
            .map_err(|_| QueueError::UnregisteredType {
                type_name: type_name.to_string(),
            })?
            .with_params(params)
            .with_removal(removal);
        self.submit(spec).await
    }

    /// Removes a queued task; a running body is not interrupted.
    ///
    /// Returns `false` if no task with `tag` is queued or after shutdown; the
    /// queue and its directory are frozen once the executor is closed.
    pub async fn cancel(&self, tag: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut st = self.state.lock().await;
        let Some(idx) = st.position(tag) else {
            return false;
        };
        st.queue.remove(idx);
        st.run_list
            .retain(|j| !matches!(j, Job::Queued(t) if t == tag));

        self.bus
            .publish(Event::new(EventKind::TaskCancelled).with_tag(tag));
        self.persist_locked(st.snapshot()).await;
        true
    }

    /// Replaces the whole queue; only valid before any execution started.
    ///
    /// Tasks with an unusable tag are skipped; of duplicate tags the first wins.
    /// Returns the number of tasks now queued.
    ///
    /// # Errors
    /// - [`QueueError::ExecutorClosed`] after shutdown
    /// - [`QueueError::AlreadyStarted`] once a task has been scheduled
    pub async fn set_queue(&self, tasks: Vec<TaskSpec>) -> Result<usize, QueueError> {
        if self.is_closed() {
            return Err(QueueError::ExecutorClosed);
        }
        let mut st = self.state.lock().await;
        if st.started {
            return Err(QueueError::AlreadyStarted);
        }

        st.queue.clear();
        st.run_list.retain(|j| matches!(j, Job::Transient(_)));
        for spec in tasks {
            if let Err(reason) = validate_tag(spec.tag()) {
                tracing::warn!(tag = %spec.tag(), reason, "task with invalid tag dropped");
                continue;
            }
            if st.position(spec.tag()).is_some() {
                tracing::warn!(tag = %spec.tag(), "duplicate task tag dropped");
                continue;
            }
            st.push(spec);
        }
        Ok(st.queue.len())
    }

    // ---------------------------
    // Execution
    // ---------------------------

    /// Schedules every queued task that is not already scheduled or running.
    ///
    /// In [`Mode::CallbackDependent`] this is a no-op while no live consumer is
    /// attached, and in every mode after shutdown. Returns the number of newly
    /// scheduled tasks.
    pub async fn execute_queue(&self) -> usize {
        if self.is_closed() {
            tracing::debug!("execute_queue ignored: executor closed");
            return 0;
        }
        let mut st = self.state.lock().await;
        if self.mode == Mode::CallbackDependent && !st.has_live_consumer() {
            tracing::debug!("execute_queue ignored: no consumer attached");
            return 0;
        }

        let running = st.running;
        let tags: Vec<String> = st
            .queue
            .iter()
            .filter(|e| Some(e.id) != running)
            .map(|e| e.spec.tag().to_string())
            .collect();

        let mut scheduled = 0;
        for tag in tags {
            if !st.is_scheduled(&tag) {
                st.run_list.push_back(Job::Queued(tag));
                scheduled += 1;
            }
        }
        if scheduled > 0 {
            st.started = true;
            self.wake.notify_one();
        }
        scheduled
    }

    /// Runs `fut` on the worker without queuing or persisting it.
    ///
    /// The job waits behind already scheduled work, ignores the delivery mode
    /// and never reaches the bound consumer; its result comes back through the
    /// returned receiver.
    ///
    /// # Errors
    /// [`QueueError::ExecutorClosed`] after shutdown.
    pub async fn execute_transient<T, F>(
        &self,
        fut: F,
    ) -> Result<oneshot::Receiver<Result<T, TaskError>>, QueueError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        if self.token.is_cancelled() {
            return Err(QueueError::ExecutorClosed);
        }
        let (tx, rx) = oneshot::channel();
        let job: BoxFuture<'static, ()> = Box::pin(async move {
            let _ = tx.send(runner::run_guarded(fut).await);
        });

        let mut st = self.state.lock().await;
        st.run_list.push_back(Job::Transient(job));
        self.wake.notify_one();
        Ok(rx)
    }

    // ---------------------------
    // Consumer binding
    // ---------------------------

    /// Binds `consumer` as the completion target and resumes a restrained queue.
    ///
    /// A result withheld by [`TaskExecutor::restrain`] is delivered to this
    /// consumer exactly once, before this call returns.
    pub async fn attach_callback(&self, consumer: ConsumerHandle) {
        let mut st = self.state.lock().await;
        st.consumer = Some(consumer);
        st.restrained = false;
        self.bus.publish(Event::new(EventKind::CallbackAttached));

        if let Some(held) = st.held.take() {
            self.deliver_locked(&st, held);
        }
        self.wake.notify_one();
    }

    /// Unbinds the consumer; later results are discarded.
    pub async fn detach_callback(&self) {
        let mut st = self.state.lock().await;
        if st.consumer.take().is_some() {
            self.bus
                .publish(Event::new(EventKind::CallbackDetached).with_reason("detach"));
        }
    }

    /// Unbinds the consumer and pauses queued tasks until the next
    /// [`TaskExecutor::attach_callback`] or [`TaskExecutor::release`].
    ///
    /// The running body, if any, continues; its result is held for the next
    /// consumer instead of being delivered or discarded. Transient jobs keep
    /// running.
    pub async fn restrain(&self) {
        let mut st = self.state.lock().await;
        st.restrained = true;
        if st.consumer.take().is_some() {
            self.bus
                .publish(Event::new(EventKind::CallbackDetached).with_reason("restrain"));
        }
    }

    /// Lifts a restrain without attaching: discards a held result and resumes draining.
    pub async fn release(&self) {
        let mut st = self.state.lock().await;
        st.restrained = false;
        if let Some(held) = st.held.take() {
            self.bus.publish(
                Event::new(EventKind::ResultDiscarded)
                    .with_tag(held.tag.as_str())
                    .with_reason("released"),
            );
        }
        self.wake.notify_one();
    }

    // ---------------------------
    // Inspection
    // ---------------------------

    /// Returns a snapshot of the queue in order.
    pub async fn get_queue(&self) -> Vec<TaskSpec> {
        self.state.lock().await.snapshot()
    }

    /// Returns the state of the queued task `tag`.
    pub async fn state(&self, tag: &str) -> Option<TaskState> {
        let st = self.state.lock().await;
        st.position(tag).map(|i| st.queue[i].state)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }

    pub async fn is_restrained(&self) -> bool {
        self.state.lock().await.restrained
    }

    /// Returns `true` if a live consumer is bound.
    pub async fn has_callback(&self) -> bool {
        self.state.lock().await.has_live_consumer()
    }

    // ---------------------------
    // Persistence
    // ---------------------------

    /// Reconciles the queue directory with the current queue.
    ///
    /// Holds the queue lock for the whole pass, so no mutation interleaves.
    /// Without a store this is a no-op.
    pub async fn synchronize(&self) -> Result<SyncReport, PersistenceError> {
        let st = self.state.lock().await;
        let Some(store) = &self.store else {
            return Ok(SyncReport::default());
        };
        let snapshot = st.snapshot();
        let report = store.synchronize(&snapshot).await?;
        self.publish_synced(&report);
        Ok(report)
    }

    /// Stops the worker once the current body (if any) finishes.
    ///
    /// Scheduled jobs are dropped; transient callers observe a closed channel.
    pub fn shutdown(&self) {
        self.token.cancel();
        self.wake.notify_one();
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    /// Mirrors `snapshot` to disk; call while the queue lock is held.
    ///
    /// `QueueState` is not `Sync` (transient jobs), so no `&QueueState` may be
    /// held across an await on the worker.
    async fn persist_locked(&self, snapshot: Vec<TaskSpec>) {
        if !self.sync_on_change {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        match store.synchronize(&snapshot).await {
            Ok(report) => self.publish_synced(&report),
            Err(e) => {
                tracing::warn!(error = %e, "queue synchronize failed");
                self.bus
                    .publish(Event::new(EventKind::PersistFailed).with_reason(e.to_string()));
            }
        }
    }

    fn publish_synced(&self, report: &SyncReport) {
        if report.is_noop() {
            return;
        }
        self.bus.publish(
            Event::new(EventKind::QueueSynchronized)
                .with_count(report.written + report.deleted)
                .with_reason(format!(
                    "written={} deleted={}",
                    report.written, report.deleted
                )),
        );
    }

    fn deliver_locked(&self, st: &QueueState, completion: Completion) {
        let tag = completion.tag.clone();
        let delivered = st
            .consumer
            .as_ref()
            .is_some_and(|c| c.deliver(completion));
        if delivered {
            self.bus
                .publish(Event::new(EventKind::ResultDelivered).with_tag(tag));
        } else {
            self.bus.publish(
                Event::new(EventKind::ResultDiscarded)
                    .with_tag(tag)
                    .with_reason("no consumer"),
            );
        }
    }

    fn next_job(&self, st: &mut QueueState) -> Option<Ready> {
        if st.restrained {
            // Restrain pauses queued tasks only.
            let idx = st
                .run_list
                .iter()
                .position(|j| matches!(j, Job::Transient(_)))?;
            return match st.run_list.remove(idx) {
                Some(Job::Transient(fut)) => Some(Ready::Transient(fut)),
                _ => None,
            };
        }
        while let Some(job) = st.run_list.pop_front() {
            let tag = match job {
                Job::Transient(fut) => return Some(Ready::Transient(fut)),
                Job::Queued(tag) => tag,
            };
            if self.mode == Mode::CallbackDependent && !st.has_live_consumer() {
                tracing::debug!("consumer gone: queued jobs dropped from run list");
                st.run_list.retain(|j| matches!(j, Job::Transient(_)));
                continue;
            }
            let Some(idx) = st.position(&tag) else {
                continue;
            };
            let entry = &mut st.queue[idx];
            entry.state = TaskState::Running;
            let (id, spec) = (entry.id, entry.spec.clone());
            st.running = Some(id);
            st.started = true;
            return Some(Ready::Queued(id, spec));
        }
        None
    }

    async fn drain(&self) {
        loop {
            if self.token.is_cancelled() {
                return;
            }
            let ready = {
                let mut st = self.state.lock().await;
                match self.next_job(&mut st) {
                    Some(ready) => ready,
                    None => return,
                }
            };
            match ready {
                Ready::Transient(fut) => fut.await,
                Ready::Queued(id, spec) => {
                    self.bus.publish(
                        Event::new(EventKind::TaskStarting)
                            .with_tag(spec.tag())
                            .with_type_name(spec.type_name()),
                    );
                    let result = runner::run_once(&spec).await;
                    self.complete(id, &spec, result).await;
                }
            }
        }
    }

    async fn complete(&self, id: u64, spec: &TaskSpec, result: TaskResult) {
        let mut st = self.state.lock().await;
        st.running = None;

        match &result {
            Ok(()) => self
                .bus
                .publish(Event::new(EventKind::TaskSucceeded).with_tag(spec.tag())),
            Err(e) => {
                tracing::debug!(tag = %spec.tag(), error = %e, "task failed");
                self.bus.publish(
                    Event::new(EventKind::TaskFailed)
                        .with_tag(spec.tag())
                        .with_reason(e.to_string()),
                );
            }
        }

        let mut removed = false;
        if let Some(idx) = st.queue.iter().position(|e| e.id == id) {
            if spec.removal().should_remove(&result) {
                st.queue.remove(idx);
                removed = true;
                self.bus
                    .publish(Event::new(EventKind::TaskRemoved).with_tag(spec.tag()));
            } else {
                st.queue[idx].state = match result {
                    Ok(()) => TaskState::Succeeded,
                    Err(_) => TaskState::Failed,
                };
            }
        }

        let completion = Completion {
            tag: spec.tag().to_string(),
            result,
        };
        if st.restrained {
            self.bus
                .publish(Event::new(EventKind::ResultWithheld).with_tag(spec.tag()));
            st.held = Some(completion);
        } else {
            self.deliver_locked(&st, completion);
        }

        if removed {
            self.persist_locked(st.snapshot()).await;
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Worker loop: drains the run list each time it is woken.
async fn worker(exec: Weak<TaskExecutor>, wake: Arc<Notify>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = wake.notified() => {}
        }
        let Some(exec) = exec.upgrade() else {
            break;
        };
        exec.drain().await;
    }
    tracing::debug!("executor worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delivery::TaskCompleted;
    use crate::tasks::TaskFn;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Recorder {
        tx: mpsc::UnboundedSender<(String, bool)>,
    }

    impl TaskCompleted for Recorder {
        fn on_task_completed(&self, tag: &str, result: &TaskResult) {
            let _ = self.tx.send((tag.to_string(), result.is_ok()));
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<(String, bool)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx }), rx)
    }

    fn ok_task(tag: &str) -> TaskSpec {
        TaskSpec::new(
            tag,
            "Ok",
            TaskFn::arc(|_p: Bundle| async { Ok::<_, TaskError>(()) }),
        )
    }

    fn failing_task(tag: &str) -> TaskSpec {
        TaskSpec::new(
            tag,
            "Fail",
            TaskFn::arc(|_p: Bundle| async { Err(TaskError::fail("nope")) }),
        )
    }

    /// Task that signals `started` and then waits for `gate`.
    fn gated_task(tag: &str, started: Arc<Notify>, gate: Arc<Notify>) -> TaskSpec {
        TaskSpec::new(
            tag,
            "Gated",
            TaskFn::arc(move |_p: Bundle| {
                let started = Arc::clone(&started);
                let gate = Arc::clone(&gate);
                async move {
                    started.notify_one();
                    gate.notified().await;
                    Ok::<_, TaskError>(())
                }
            }),
        )
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, bool)>) -> (String, bool) {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("callback channel closed")
    }

    #[tokio::test]
    async fn test_duplicate_tag_is_rejected() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.submit(ok_task("a")).await.unwrap();
        let err = exec.submit(ok_task("a")).await.unwrap_err();
        assert_eq!(err, QueueError::DuplicateTag { tag: "a".into() });
        assert_eq!(exec.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_tag_is_rejected() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let err = exec.submit(ok_task("a/b")).await.unwrap_err();
        assert_eq!(err.as_label(), "queue_invalid_tag");
        assert!(exec.is_empty().await);
    }

    #[tokio::test]
    async fn test_submit_named_requires_registration() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let err = exec
            .submit_named("a", "Missing", Bundle::new(), RemovalPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::UnregisteredType {
                type_name: "Missing".into()
            }
        );
    }

    #[tokio::test]
    async fn test_runs_in_submission_order() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (rec, mut rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&rec)).await;

        for tag in ["a", "b", "c"] {
            exec.submit(ok_task(tag)).await.unwrap();
        }
        assert_eq!(exec.execute_queue().await, 3);

        for tag in ["a", "b", "c"] {
            assert_eq!(recv(&mut rx).await, (tag.to_string(), true));
        }
        assert!(exec.is_empty().await);
    }

    #[tokio::test]
    async fn test_removal_policy_keeps_failed_task() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (rec, mut rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&rec)).await;

        exec.submit(failing_task("f")).await.unwrap();
        exec.submit(failing_task("g").with_removal(RemovalPolicy::always()))
            .await
            .unwrap();
        exec.execute_queue().await;

        assert_eq!(recv(&mut rx).await, ("f".to_string(), false));
        assert_eq!(recv(&mut rx).await, ("g".to_string(), false));
        assert_eq!(exec.state("f").await, Some(TaskState::Failed));
        assert_eq!(exec.state("g").await, None);
    }

    #[tokio::test]
    async fn test_panicking_body_is_a_failure() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (rec, mut rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&rec)).await;

        let boom = TaskSpec::new(
            "boom",
            "Boom",
            TaskFn::arc(|p: Bundle| async move {
                if p.is_empty() {
                    panic!("boom");
                }
                Ok::<_, TaskError>(())
            }),
        );
        exec.submit(boom).await.unwrap();
        exec.submit(ok_task("after")).await.unwrap();
        exec.execute_queue().await;

        assert_eq!(recv(&mut rx).await, ("boom".to_string(), false));
        assert_eq!(recv(&mut rx).await, ("after".to_string(), true));
        assert_eq!(exec.state("boom").await, Some(TaskState::Failed));
    }

    #[tokio::test]
    async fn test_dependent_mode_without_consumer_is_noop() {
        let exec = TaskExecutor::in_memory(Mode::CallbackDependent);
        exec.submit(ok_task("a")).await.unwrap();
        assert_eq!(exec.execute_queue().await, 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exec.state("a").await, Some(TaskState::Pending));

        exec.set_queue(vec![ok_task("b")]).await.unwrap();
        assert_eq!(exec.len().await, 1);
    }

    #[tokio::test]
    async fn test_inconsiderate_mode_discards_without_consumer() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let mut events = exec.bus().subscribe();
        exec.submit(ok_task("a")).await.unwrap();
        exec.execute_queue().await;

        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if ev.kind == EventKind::ResultDiscarded {
                assert_eq!(ev.tag.as_deref(), Some("a"));
                break;
            }
        }
        assert!(exec.is_empty().await);
    }

    #[tokio::test]
    async fn test_restrain_holds_result_for_next_consumer() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (first, mut first_rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&first)).await;

        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        exec.submit(gated_task("slow", Arc::clone(&started), Arc::clone(&gate)))
            .await
            .unwrap();
        exec.submit(ok_task("next")).await.unwrap();
        exec.execute_queue().await;

        started.notified().await;
        exec.restrain().await;
        gate.notify_one();

        // Wait until the worker parked the result.
        for _ in 0..200 {
            if exec.state("slow").await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(exec.is_restrained().await);
        assert_eq!(exec.state("next").await, Some(TaskState::Pending));

        let (second, mut second_rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&second)).await;
        assert_eq!(second_rx.try_recv().unwrap(), ("slow".to_string(), true));
        assert_eq!(recv(&mut second_rx).await, ("next".to_string(), true));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_release_discards_held_result() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        exec.submit(gated_task("slow", Arc::clone(&started), Arc::clone(&gate)))
            .await
            .unwrap();
        exec.submit(ok_task("next")).await.unwrap();
        exec.execute_queue().await;

        started.notified().await;
        exec.restrain().await;
        gate.notify_one();
        for _ in 0..200 {
            if exec.state("slow").await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        exec.release().await;
        for _ in 0..200 {
            if exec.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(exec.is_empty().await);

        let (late, mut late_rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&late)).await;
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_queue_after_start_fails() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.set_queue(vec![ok_task("a"), ok_task("a"), ok_task("b")])
            .await
            .unwrap();
        assert_eq!(exec.len().await, 2);

        exec.execute_queue().await;
        assert_eq!(
            exec.set_queue(vec![]).await.unwrap_err(),
            QueueError::AlreadyStarted
        );
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_task() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.submit(ok_task("a")).await.unwrap();
        assert!(exec.cancel("a").await);
        assert!(!exec.cancel("a").await);
        assert!(exec.is_empty().await);
    }

    #[tokio::test]
    async fn test_transient_job_bypasses_queue() {
        let exec = TaskExecutor::in_memory(Mode::CallbackDependent);
        let rx = exec
            .execute_transient(async { Ok::<_, TaskError>(41 + 1) })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Ok(42));
        assert!(exec.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_consumer_is_not_kept_alive() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (rec, _rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&rec)).await;
        assert!(exec.has_callback().await);
        drop(rec);
        assert!(!exec.has_callback().await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transient_jobs() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.shutdown();
        let err = exec
            .execute_transient(async { Ok::<_, TaskError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::ExecutorClosed);
    }

    #[tokio::test]
    async fn test_transient_job_runs_while_restrained() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.submit(ok_task("queued")).await.unwrap();
        exec.restrain().await;
        exec.execute_queue().await;

        let rx = exec
            .execute_transient(async { Ok::<_, TaskError>(7u32) })
            .await
            .unwrap();
        let res = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("transient job stalled by restrain")
            .unwrap();
        assert_eq!(res, Ok(7));

        assert!(exec.is_restrained().await);
        assert_eq!(exec.state("queued").await, Some(TaskState::Pending));
    }

    #[tokio::test]
    async fn test_closed_executor_rejects_queue_changes() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        exec.submit(ok_task("early")).await.unwrap();
        exec.shutdown();

        assert_eq!(
            exec.submit(ok_task("late")).await.unwrap_err(),
            QueueError::ExecutorClosed
        );
        assert_eq!(exec.execute_queue().await, 0);
        assert!(!exec.cancel("early").await);
        assert_eq!(
            exec.set_queue(vec![]).await.unwrap_err(),
            QueueError::ExecutorClosed
        );

        let tags: Vec<String> = exec
            .get_queue()
            .await
            .iter()
            .map(|t| t.tag().to_string())
            .collect();
        assert_eq!(tags, vec!["early"]);
        assert_eq!(exec.state("early").await, Some(TaskState::Pending));
    }

    #[tokio::test]
    async fn test_single_worker_never_overlaps() {
        let exec = TaskExecutor::in_memory(Mode::CallbackInconsiderate);
        let (rec, mut rx) = recorder();
        exec.attach_callback(ConsumerHandle::inline(&rec)).await;

        let active = Arc::new(StdMutex::new((0usize, 0usize)));
        for i in 0..5 {
            let active = Arc::clone(&active);
            let body = TaskFn::arc(move |_p: Bundle| {
                let active = Arc::clone(&active);
                async move {
                    {
                        let mut a = active.lock().unwrap();
                        a.0 += 1;
                        a.1 = a.1.max(a.0);
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.lock().unwrap().0 -= 1;
                    Ok::<_, TaskError>(())
                }
            });
            exec.submit(TaskSpec::new(format!("t{i}"), "Count", body))
                .await
                .unwrap();
        }
        exec.execute_queue().await;
        for _ in 0..5 {
            recv(&mut rx).await;
        }
        assert_eq!(active.lock().unwrap().1, 1);
    }
}
