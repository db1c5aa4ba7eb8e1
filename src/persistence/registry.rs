//! # Task type registry.
//!
//! Maps a recorded type name to a zero-argument factory producing a fresh task
//! body. Populated once at process start; a cold-start restore looks bodies up
//! here instead of instantiating types dynamically, so restore failures are
//! bounded to "name not registered".
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskhold::{Bundle, Task, TaskError, TaskRegistry};
//!
//! #[derive(Default)]
//! struct Cleanup;
//!
//! #[async_trait]
//! impl Task for Cleanup {
//!     async fn execute(&self, _params: &Bundle) -> Result<(), TaskError> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = TaskRegistry::new().with_default::<Cleanup>("Cleanup");
//! assert!(registry.resolve("Cleanup").is_ok());
//! assert!(registry.resolve("Missing").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RecordError;
use crate::tasks::{Task, TaskRef};

type Factory = Arc<dyn Fn() -> TaskRef + Send + Sync>;

/// Registry of task bodies constructible by type name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, Factory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `type_name`; a later registration of the same name wins.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> TaskRef + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self
            .factories
            .insert(type_name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!(type_name = %type_name, "task factory replaced");
        }
        self
    }

    /// Registers a type built through its `Default` implementation.
    pub fn register_default<T>(&mut self, type_name: impl Into<String>) -> &mut Self
    where
        T: Task + Default,
    {
        self.register(type_name, || Arc::new(T::default()) as TaskRef)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> TaskRef + Send + Sync + 'static,
    {
        self.register(type_name, factory);
        self
    }

    /// Builder form of [`register_default`](Self::register_default).
    pub fn with_default<T>(mut self, type_name: impl Into<String>) -> Self
    where
        T: Task + Default,
    {
        self.register_default::<T>(type_name);
        self
    }

    /// Produces a fresh body for `type_name`.
    pub fn resolve(&self, type_name: &str) -> Result<TaskRef, RecordError> {
        self.factories
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| RecordError::UnregisteredType {
                type_name: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry").field("types", &names).finish()
    }
}
