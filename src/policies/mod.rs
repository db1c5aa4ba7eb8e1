//! Completion policies.
//!
//! ## Contents
//! - [`RemovalPolicy`] whether a finished task leaves the queue (on success / on exception)
//!
//! ## Quick wiring
//! ```text
//! TaskSpec { removal: RemovalPolicy, .. }
//!      └─► core::executor completion step:
//!           - removal.should_remove(&outcome) → drop from queue, resynchronize disk
//!           - otherwise the task stays queued (Succeeded/Failed) for a later retry
//! ```

mod removal;

pub use removal::RemovalPolicy;
