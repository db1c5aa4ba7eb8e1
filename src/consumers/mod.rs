//! Consumer-side helpers built on the host.
//!
//! - [`Attachment`] ties a consumer's pause/resume lifecycle to the executor.
//! - [`TaskLoader`] runs a one-shot producing body on the executor worker.

mod attachment;
mod loader;

pub use attachment::{Attachment, AttachmentOptions};
pub use loader::TaskLoader;
