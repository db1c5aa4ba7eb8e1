//! # Runtime events emitted by the executor and its host.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Queue events**: submission, cancellation and completion-policy removal
//! - **Execution events**: a task starting and reaching a terminal state
//! - **Delivery events**: callback attach/detach and the fate of each result
//! - **Persistence events**: restore, reconciliation and disk failures
//!
//! The [`Event`] struct carries the tag, type name and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use taskhold::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_tag("upload-7")
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.tag.as_deref(), Some("upload-7"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing (`tag`: subscriber name, `reason`: panic info).
    SubscriberPanicked,
    /// Subscriber dropped an event (`tag`: subscriber name, `reason`: "full" / "closed").
    SubscriberOverflow,

    // === Queue events ===
    /// Task appended to the queue (`tag`, `type_name`).
    TaskSubmitted,
    /// Task explicitly removed by a consumer (`tag`).
    TaskCancelled,
    /// Task removed by its completion policy (`tag`).
    TaskRemoved,

    // === Execution events ===
    /// Worker started the task body (`tag`, `type_name`).
    TaskStarting,
    /// Body returned `Ok` (`tag`).
    TaskSucceeded,
    /// Body returned an error or panicked (`tag`, `reason`).
    TaskFailed,

    // === Delivery events ===
    /// A consumer was bound as the completion target.
    CallbackAttached,
    /// The completion target was cleared (`reason`: "detach" / "restrain").
    CallbackDetached,
    /// Result handed to the consumer's delivery context (`tag`).
    ResultDelivered,
    /// Result held back while restrained (`tag`).
    ResultWithheld,
    /// Result dropped: no consumer bound, or released while withheld (`tag`, `reason`).
    ResultDiscarded,

    // === Persistence events ===
    /// Cold start restored tasks from disk (`count`).
    QueueRestored,
    /// Persisted record could not be rebuilt (`tag`: file name, `reason`).
    RecordSkipped,
    /// Directory reconciled with the queue (`count`: files written + deleted).
    QueueSynchronized,
    /// Restore or synchronize failed (`reason`).
    PersistFailed,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Task tag (or subscriber / file name, see [`EventKind`]).
    pub tag: Option<Arc<str>>,
    /// Registered type name of the task.
    pub type_name: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Count payload (restored tasks, touched files).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            tag: None,
            type_name: None,
            reason: None,
            count: None,
        }
    }

    #[inline]
    pub fn with_tag(mut self, tag: impl Into<Arc<str>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[inline]
    pub fn with_type_name(mut self, type_name: impl Into<Arc<str>>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a count, saturating at `u32::MAX`.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_tag(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_tag(subscriber)
            .with_reason(info)
    }
}
