//! Runtime core: the executor, its host and result delivery.
//!
//! Public API from this module:
//! - [`ExecutorHost`] / [`HostBuilder`]: process-wide owner of the executor;
//! - [`TaskExecutor`]: the persistent sequential queue and its worker;
//! - [`ConsumerHandle`], [`DeliveryContext`], [`TaskCompleted`]: result delivery.
//!
//! Internal modules:
//! - [`runner`]: runs one body and contains panics;
//! - [`delivery`]: consumer binding and callback contexts.

use std::any::Any;

mod builder;
mod delivery;
mod executor;
mod host;
mod runner;

pub use builder::HostBuilder;
pub use delivery::{ConsumerHandle, DeliveryContext, DeliveryLoop, TaskCompleted, TaskResult};
pub use executor::{TaskExecutor, TaskState};
pub use host::{ExecutorHost, ReferenceReady, TasksRestored};

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
