//! # Queued task description.
//!
//! Defines [`TaskSpec`], the value object the executor queues and the
//! persistence layer writes to disk: identity (tag), type name, parameter
//! bundle, removal policy and the executable body.
//!
//! A spec can be created:
//! - **Explicitly** with [`TaskSpec::new`] from a body you already hold;
//! - **By type name** with [`TaskSpec::from_registry`], resolving the body
//!   through a [`TaskRegistry`] exactly as a cold-start restore does.
//!
//! ## Rules
//! - The tag is unique within a live queue and doubles as the on-disk file name.
//! - Only specs whose type name is registered survive a restart.

use std::fmt;

use crate::error::RecordError;
use crate::persistence::{PersistedRecord, TaskRegistry};
use crate::policies::RemovalPolicy;
use crate::tasks::{Bundle, TaskRef};

/// Specification of one queued task.
///
/// ## Example
/// ```rust
/// use taskhold::{Bundle, RemovalPolicy, TaskError, TaskFn, TaskSpec};
///
/// let spec = TaskSpec::new(
///     "upload-42",
///     "Upload",
///     TaskFn::arc(|_params: Bundle| async { Ok::<_, TaskError>(()) }),
/// )
/// .with_params(Bundle::new().with("path", "/tmp/42.bin"))
/// .with_removal(RemovalPolicy::always());
///
/// assert_eq!(spec.tag(), "upload-42");
/// assert!(spec.removal().on_exception);
/// ```
#[derive(Clone)]
pub struct TaskSpec {
    tag: String,
    type_name: String,
    params: Bundle,
    removal: RemovalPolicy,
    task: TaskRef,
}

impl TaskSpec {
    /// Creates a spec with an empty bundle and the default removal policy.
    pub fn new(tag: impl Into<String>, type_name: impl Into<String>, task: TaskRef) -> Self {
        Self {
            tag: tag.into(),
            type_name: type_name.into(),
            params: Bundle::new(),
            removal: RemovalPolicy::default(),
            task,
        }
    }

    /// Creates a spec whose body is produced by the factory registered for `type_name`.
    pub fn from_registry(
        tag: impl Into<String>,
        type_name: impl Into<String>,
        registry: &TaskRegistry,
    ) -> Result<Self, RecordError> {
        let type_name = type_name.into();
        let task = registry.resolve(&type_name)?;
        Ok(Self::new(tag, type_name, task))
    }

    /// Rebuilds a spec from a decoded record.
    pub(crate) fn from_record(
        record: PersistedRecord,
        registry: &TaskRegistry,
    ) -> Result<Self, RecordError> {
        if record.tag.is_empty() {
            return Err(RecordError::EmptyTag);
        }
        let task = registry.resolve(&record.type_name)?;
        Ok(Self {
            tag: record.tag,
            type_name: record.type_name,
            params: record.params,
            removal: record.removal,
            task,
        })
    }

    /// Projects the persistable fields.
    pub fn to_record(&self) -> PersistedRecord {
        PersistedRecord {
            type_name: self.type_name.clone(),
            tag: self.tag.clone(),
            params: self.params.clone(),
            removal: self.removal,
            seq: 0,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn params(&self) -> &Bundle {
        &self.params
    }

    pub fn removal(&self) -> RemovalPolicy {
        self.removal
    }

    /// Returns reference to the task body.
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Returns a new spec with the given parameter bundle.
    pub fn with_params(mut self, params: Bundle) -> Self {
        self.params = params;
        self
    }

    /// Returns a new spec with the given removal policy.
    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("params", &self.params)
            .field("removal", &self.removal)
            .finish_non_exhaustive()
    }
}
