//! # Task abstractions and specifications.
//!
//! This module provides the core task-related types:
//! - [`Task`] - trait for implementing task bodies
//! - [`TaskFn`] - function-backed task implementation
//! - [`TaskRef`] - shared reference to a task body (`Arc<dyn Task>`)
//! - [`TaskSpec`] - queued task: tag, type name, parameters and removal policy
//! - [`Bundle`], [`Value`] - the serializable parameter map

mod bundle;
mod spec;
mod task;
mod task_fn;

pub use bundle::{Bundle, Value};
pub use spec::TaskSpec;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
