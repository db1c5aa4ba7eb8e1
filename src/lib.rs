//! # taskhold
//!
//! **Taskhold** is a durable, single-worker background task queue.
//!
//! Tasks are queued under a unique tag, mirrored to disk one file per task,
//! executed strictly one at a time, and their results delivered to whichever
//! consumer is currently bound. A consumer that goes away temporarily can
//! restrain the executor so the result produced meanwhile is held and handed
//! to the next consumer exactly once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Attachment  │   │  TaskLoader  │   │   consumer   │
//!     │ (pause/resume│   │  (one-shot)  │   │  (direct)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ request_reference(mode)             ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ExecutorHost (one per process)                                   │
//! │  - QueueStore (restore on cold start, synchronize on change)      │
//! │  - TaskRegistry (type name → body factory)                        │
//! │  - Bus + SubscriberSet (events fan-out)                           │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  TaskExecutor                                                     │
//! │  - queue: [TaskSpec { tag, type_name, params, removal }]          │
//! │  - consumer binding (weak) + restrain/held result                 │
//! │  - single worker: run_once → RemovalPolicy → deliver/hold/discard │
//! └──────┬─────────────────────────────┬──────────────────────────────┘
//!        ▼                             ▼
//!   DeliveryContext               <queue_dir>/<tag>
//!   (inline / spawn / channel)    (binary record per task)
//! ```
//!
//! ### Lifecycle of a queued task
//! ```text
//! submit ──► Pending ──► execute_queue ──► Running ──► Ok ─────► Succeeded
//!                                              │                   │
//!                                              └─► Err/panic ─► Failed
//!                                                                  │
//!                         RemovalPolicy ◄──────────────────────────┘
//!                           ├─ remove → dropped from queue, file deleted
//!                           └─ keep   → stays queued, runs again on next execute_queue
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                            |
//! |-------------------|---------------------------------------------------------------|-----------------------------------------------|
//! | **Tasks**         | Task bodies, parameters and queued specs.                     | [`Task`], [`TaskFn`], [`Bundle`], [`TaskSpec`]|
//! | **Execution**     | Sequential persistent queue with consumer rebinding.          | [`TaskExecutor`], [`ExecutorHost`]            |
//! | **Delivery**      | Where and to whom completion callbacks go.                    | [`TaskCompleted`], [`DeliveryContext`]        |
//! | **Persistence**   | Record codec, type registry, queue directory.                 | [`QueueStore`], [`TaskRegistry`]              |
//! | **Policies**      | Whether a finished task leaves the queue.                     | [`RemovalPolicy`]                             |
//! | **Subscriber API**| Hook into queue, execution and persistence events.            | [`Subscribe`], [`Event`]                      |
//! | **Errors**        | Typed errors for queue, task, record and disk failures.       | [`QueueError`], [`TaskError`]                 |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use taskhold::{
//!     Attachment, AttachmentOptions, Bundle, Config, DeliveryContext, ExecutorHost,
//!     RemovalPolicy, TaskCompleted, TaskError, TaskFn, TaskRef, TaskRegistry, TaskResult,
//! };
//!
//! struct Screen(tokio::sync::mpsc::UnboundedSender<String>);
//!
//! impl TaskCompleted for Screen {
//!     fn on_task_completed(&self, tag: &str, result: &TaskResult) {
//!         let _ = self.0.send(format!("{tag}: {}", if result.is_ok() { "ok" } else { "failed" }));
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = TaskRegistry::new().with("Greet", || {
//!         TaskFn::arc(|params: Bundle| async move {
//!             println!("hello, {}", params.get_str("name").unwrap_or("world"));
//!             Ok::<_, TaskError>(())
//!         }) as TaskRef
//!     });
//!
//!     let dir = std::env::temp_dir().join("taskhold-doc-lib");
//!     let host = ExecutorHost::builder(Config::with_root(&dir))
//!         .with_registry(registry)
//!         .build();
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let screen = Attachment::new(
//!         host.clone(),
//!         Arc::new(Screen(tx)),
//!         DeliveryContext::inline(),
//!         AttachmentOptions::default(),
//!     );
//!
//!     let exec = screen.resume().await?;
//!     let _ = exec.cancel("greet-1").await;
//!     exec.submit_named("greet-1", "Greet", Bundle::new().with("name", "queue"), RemovalPolicy::always())
//!         .await?;
//!     exec.execute_queue().await;
//!
//!     assert_eq!(rx.recv().await.as_deref(), Some("greet-1: ok"));
//!     host.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod consumers;
mod core;
mod error;
mod events;
mod persistence;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use config::{Config, Mode, QUEUE_DIR_NAME};
pub use consumers::{Attachment, AttachmentOptions, TaskLoader};
pub use core::{
    ConsumerHandle, DeliveryContext, DeliveryLoop, ExecutorHost, HostBuilder, ReferenceReady,
    TaskCompleted, TaskExecutor, TaskResult, TaskState, TasksRestored,
};
pub use error::{PersistenceError, QueueError, RecordError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use persistence::{PersistedRecord, QueueStore, Restored, SyncReport, TaskRegistry};
pub use policies::RemovalPolicy;
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Bundle, Task, TaskFn, TaskRef, TaskSpec, Value};

// Optional: expose a built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
