//! # LogWriter - tracing event renderer
//!
//! A subscriber that renders every [`Event`] as a structured `tracing` record.
//! Failures and persistence problems are logged at `warn`, everything else at
//! `debug` or `info`. Install a `tracing-subscriber` to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO taskhold: task submitted tag="upload-1" type_name="Upload"
//! DEBUG taskhold: task starting tag="upload-1"
//! WARN taskhold: task failed tag="upload-1" reason="execution failed: timeout"
//! DEBUG taskhold: result withheld tag="upload-1"
//! INFO taskhold: queue restored count=3
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tag = e.tag.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::TaskSubmitted => tracing::info!(
                target: "taskhold",
                seq = e.seq,
                tag,
                type_name = e.type_name.as_deref().unwrap_or("-"),
                "task submitted"
            ),
            EventKind::TaskStarting => {
                tracing::debug!(target: "taskhold", seq = e.seq, tag, "task starting")
            }
            EventKind::TaskSucceeded => {
                tracing::info!(target: "taskhold", seq = e.seq, tag, "task succeeded")
            }
            EventKind::TaskFailed => {
                tracing::warn!(target: "taskhold", seq = e.seq, tag, reason, "task failed")
            }
            EventKind::TaskRemoved => {
                tracing::debug!(target: "taskhold", seq = e.seq, tag, "task removed by policy")
            }
            EventKind::TaskCancelled => {
                tracing::info!(target: "taskhold", seq = e.seq, tag, "task cancelled")
            }
            EventKind::CallbackAttached => {
                tracing::debug!(target: "taskhold", seq = e.seq, "callback attached")
            }
            EventKind::CallbackDetached => {
                tracing::debug!(target: "taskhold", seq = e.seq, reason, "callback detached")
            }
            EventKind::ResultDelivered => {
                tracing::debug!(target: "taskhold", seq = e.seq, tag, "result delivered")
            }
            EventKind::ResultWithheld => {
                tracing::debug!(target: "taskhold", seq = e.seq, tag, "result withheld")
            }
            EventKind::ResultDiscarded => {
                tracing::debug!(target: "taskhold", seq = e.seq, tag, reason, "result discarded")
            }
            EventKind::QueueRestored => tracing::info!(
                target: "taskhold",
                seq = e.seq,
                count = e.count.unwrap_or(0),
                "queue restored"
            ),
            EventKind::RecordSkipped => {
                tracing::warn!(target: "taskhold", seq = e.seq, file = tag, reason, "record skipped")
            }
            EventKind::QueueSynchronized => tracing::debug!(
                target: "taskhold",
                seq = e.seq,
                touched = e.count.unwrap_or(0),
                "queue synchronized"
            ),
            EventKind::PersistFailed => {
                tracing::warn!(target: "taskhold", seq = e.seq, reason, "persistence failed")
            }
            EventKind::SubscriberOverflow => tracing::warn!(
                target: "taskhold",
                seq = e.seq,
                subscriber = tag,
                reason,
                "subscriber overflow"
            ),
            EventKind::SubscriberPanicked => tracing::warn!(
                target: "taskhold",
                seq = e.seq,
                subscriber = tag,
                reason,
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
