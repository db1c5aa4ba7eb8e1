//! # Host configuration.
//!
//! Provides [`Config`], the settings an [`ExecutorHost`](crate::ExecutorHost) is
//! built from, and [`Mode`], the executor's delivery discipline.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1 by [`Config::bus_capacity_clamped`].
//! - `sync_on_change = false` → disk is only reconciled by explicit
//!   `synchronize()` calls and on host shutdown.

use std::path::{Path, PathBuf};

/// Directory name the queue lives in, relative to the host's root.
pub const QUEUE_DIR_NAME: &str = "TaskExecutor";

/// How the executor treats queued work when no consumer is attached.
///
/// Fixed for the lifetime of an executor; a host creates it with the mode of
/// the first reference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Queued tasks only run while a live consumer is attached.
    ///
    /// `execute_queue()` is a no-op without one, and losing the consumer
    /// drops queued tasks from the run list (they stay queued).
    CallbackDependent,
    /// Tasks run regardless of consumer presence; results produced while
    /// nobody listens (and nothing is restrained) are discarded.
    #[default]
    CallbackInconsiderate,
}

impl Mode {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Mode::CallbackDependent => "callback_dependent",
            Mode::CallbackInconsiderate => "callback_inconsiderate",
        }
    }
}

/// Settings of one executor host.
///
/// ## Field semantics
/// - `queue_dir`: directory holding one record file per queued task
/// - `mode`: mode used by helpers that do not pick one (e.g. [`TaskLoader`](crate::TaskLoader))
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `sync_on_change`: reconcile disk after every queue mutation
#[derive(Clone, Debug)]
pub struct Config {
    /// Queue directory; created on first use.
    pub queue_dir: PathBuf,

    /// Default delivery mode.
    pub mode: Mode,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Slow subscribers lagging more than this many events skip older ones.
    pub bus_capacity: usize,

    /// Reconcile the queue directory after every submit, cancel and
    /// policy-driven removal.
    pub sync_on_change: bool,
}

impl Config {
    /// Config whose queue directory is `<root>/TaskExecutor`.
    ///
    /// ```
    /// use taskhold::Config;
    ///
    /// let cfg = Config::with_root("/var/lib/app");
    /// assert!(cfg.queue_dir.ends_with("TaskExecutor"));
    /// ```
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            queue_dir: root.as_ref().join(QUEUE_DIR_NAME),
            ..Self::default()
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `queue_dir = ./TaskExecutor`
    /// - `mode = CallbackInconsiderate`
    /// - `bus_capacity = 1024`
    /// - `sync_on_change = true`
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from(".").join(QUEUE_DIR_NAME),
            mode: Mode::default(),
            bus_capacity: 1024,
            sync_on_change: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.mode, Mode::CallbackInconsiderate);
        assert!(cfg.sync_on_change);
        assert_eq!(cfg.queue_dir, Path::new("./TaskExecutor"));
    }

    #[test]
    fn test_bus_capacity_is_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
