//! Queue persistence: record codec, type registry and the queue directory.
//!
//! ## Contents
//! - [`PersistedRecord`] binary projection of a task (encode/decode)
//! - [`TaskRegistry`] type name → zero-argument factory
//! - [`QueueStore`] one file per queued task; `restore` and `synchronize`
//!
//! ## Quick wiring
//! ```text
//! ExecutorHost (cold start) ──► QueueStore::restore() ──► TaskExecutor::set_queue()
//! TaskExecutor (queue mutation) ──► QueueStore::synchronize(snapshot)
//! ```

mod codec;
mod registry;
mod store;

pub use codec::PersistedRecord;
pub use registry::TaskRegistry;
pub use store::{QueueStore, Restored, SyncReport};

pub(crate) use store::validate_tag;
