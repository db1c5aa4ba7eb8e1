//! Error types used by the executor, the persistence layer and task bodies.
//!
//! This module defines four error enums:
//!
//! - [`QueueError`] - rejected queue operations (duplicate or unusable tags, late `set_queue`).
//! - [`TaskError`] - failures of an individual task body; always contained by the executor.
//! - [`RecordError`] - a persisted record that cannot be turned back into a task.
//! - [`PersistenceError`] - disk I/O failures while restoring or synchronizing the queue.
//!
//! All types provide `as_label` (stable snake_case for logs/events) and `as_message`.

use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced by queue operations.
///
/// A rejected operation leaves the queue unchanged.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A task with the same tag is already queued.
    #[error("task tag {tag:?} is already queued")]
    DuplicateTag {
        /// The conflicting tag.
        tag: String,
    },

    /// The tag cannot double as a file name in the queue directory.
    #[error("task tag {tag:?} is invalid: {reason}")]
    InvalidTag {
        /// The rejected tag.
        tag: String,
        /// Why the tag was rejected.
        reason: &'static str,
    },

    /// No factory is registered for the submitted type name.
    #[error("task type {type_name:?} is not registered")]
    UnregisteredType {
        /// The unknown type name.
        type_name: String,
    },

    /// `set_queue` was called after the executor started running tasks.
    #[error("queue can only be replaced before execution starts")]
    AlreadyStarted,

    /// The executor worker has been shut down.
    #[error("executor is shut down")]
    ExecutorClosed,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use taskhold::QueueError;
    ///
    /// let err = QueueError::DuplicateTag { tag: "upload".into() };
    /// assert_eq!(err.as_label(), "queue_duplicate_tag");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::DuplicateTag { .. } => "queue_duplicate_tag",
            QueueError::InvalidTag { .. } => "queue_invalid_tag",
            QueueError::UnregisteredType { .. } => "queue_unregistered_type",
            QueueError::AlreadyStarted => "queue_already_started",
            QueueError::ExecutorClosed => "queue_executor_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            QueueError::DuplicateTag { tag } => format!("duplicate tag: {tag}"),
            QueueError::InvalidTag { tag, reason } => format!("invalid tag {tag:?}: {reason}"),
            QueueError::UnregisteredType { type_name } => format!("unknown type {type_name:?}"),
            QueueError::AlreadyStarted => "execution already started".to_string(),
            QueueError::ExecutorClosed => "executor closed".to_string(),
        }
    }
}

/// # Errors produced by task bodies.
///
/// These are captured as the task's `Failed` result and evaluated against
/// `remove_on_exception`; they never abort queue draining.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The body returned an error.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The body panicked; the panic was caught on the worker.
    #[error("task panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    ///
    /// # Example
    /// ```
    /// use taskhold::TaskError;
    ///
    /// let err = TaskError::fail("disk full");
    /// assert_eq!(err.as_label(), "task_failed");
    /// assert_eq!(err.to_string(), "execution failed: disk full");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced while reconstructing a task from a persisted record.
///
/// During restore an invalid record is logged and skipped; it never aborts
/// restoring the rest of the queue.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The buffer ended before the field being read.
    #[error("record truncated while reading {field}")]
    Truncated {
        /// Field being decoded.
        field: &'static str,
    },

    /// The record does not start with the expected magic bytes.
    #[error("record has a bad magic header")]
    BadMagic,

    /// The record was written by an unknown format version.
    #[error("unsupported record version {version}")]
    UnsupportedVersion {
        /// Version byte found in the record.
        version: u8,
    },

    /// A string field holds invalid UTF-8.
    #[error("record field {field} is not valid utf-8")]
    InvalidUtf8 {
        /// Field being decoded.
        field: &'static str,
    },

    /// A bundle entry carries an unknown value kind.
    #[error("unknown bundle value kind {kind:#04x}")]
    UnknownValueKind {
        /// Kind byte found in the record.
        kind: u8,
    },

    /// Bytes remain after the record was fully decoded.
    #[error("{count} trailing bytes after record")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },

    /// The record carries an empty tag.
    #[error("record has an empty tag")]
    EmptyTag,

    /// No factory is registered for the recorded type name.
    #[error("task type {type_name:?} is not registered")]
    UnregisteredType {
        /// The recorded type name.
        type_name: String,
    },
}

impl RecordError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use taskhold::RecordError;
    ///
    /// let err = RecordError::UnregisteredType { type_name: "Upload".into() };
    /// assert_eq!(err.as_label(), "record_unregistered_type");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RecordError::Truncated { .. } => "record_truncated",
            RecordError::BadMagic => "record_bad_magic",
            RecordError::UnsupportedVersion { .. } => "record_unsupported_version",
            RecordError::InvalidUtf8 { .. } => "record_invalid_utf8",
            RecordError::UnknownValueKind { .. } => "record_unknown_value_kind",
            RecordError::TrailingBytes { .. } => "record_trailing_bytes",
            RecordError::EmptyTag => "record_empty_tag",
            RecordError::UnregisteredType { .. } => "record_unregistered_type",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by disk persistence.
///
/// Surfaced to the caller of `restore`/`synchronize`. The in-memory queue stays
/// the source of truth; a failed write only means disk state lags until retried.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// A filesystem operation failed.
    #[error("{op} {path:?} failed: {source}")]
    Io {
        /// Operation that failed (`"read"`, `"write"`, `"delete"`, ...).
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A queued tag cannot be mapped onto a file name.
    #[error("tag {tag:?} cannot be persisted")]
    InvalidTag {
        /// The offending tag.
        tag: String,
    },
}

impl PersistenceError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistenceError::Io { .. } => "persistence_io",
            PersistenceError::InvalidTag { .. } => "persistence_invalid_tag",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PersistenceError::Io { op, path, source } => {
                format!("{op} {}: {source}", path.display())
            }
            PersistenceError::InvalidTag { tag } => format!("unpersistable tag {tag:?}"),
        }
    }
}
