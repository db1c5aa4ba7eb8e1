//! # One-shot data loading on the executor worker.
//!
//! [`TaskLoader`] runs a producing body as a transient job: it shares the
//! executor's single worker with queued tasks but is never queued, persisted,
//! or delivered to the bound consumer.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::core::{ExecutorHost, ReferenceReady, TaskExecutor};
use crate::error::TaskError;

type Producer<D> = dyn Fn() -> BoxFuture<'static, Result<D, TaskError>> + Send + Sync;

/// Loads a value of type `D` on the host's executor.
///
/// ## Example
/// ```rust
/// use taskhold::{Config, ExecutorHost, TaskError, TaskLoader};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let dir = std::env::temp_dir().join("taskhold-doc-loader");
///     let host = ExecutorHost::builder(Config::with_root(&dir)).build();
///
///     let loader = TaskLoader::new(host.clone(), || async { Ok::<_, TaskError>(vec![1, 2, 3]) });
///     assert_eq!(loader.load().await.unwrap(), vec![1, 2, 3]);
///     host.shutdown().await.unwrap();
/// }
/// ```
pub struct TaskLoader<D> {
    host: Arc<ExecutorHost>,
    producer: Arc<Producer<D>>,
}

impl<D: Send + 'static> TaskLoader<D> {
    /// Creates a loader whose body is produced by `f` on each [`TaskLoader::load`].
    pub fn new<F, Fut>(host: Arc<ExecutorHost>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, TaskError>> + Send + 'static,
    {
        Self {
            host,
            producer: Arc::new(move || -> BoxFuture<'static, Result<D, TaskError>> {
                Box::pin(f())
            }),
        }
    }

    /// Runs the body once and returns its value.
    ///
    /// Requests the executor with the host's configured mode, creating it on
    /// a cold start. The mode does not affect transient jobs.
    pub async fn load(&self) -> Result<D, TaskError> {
        let exec = self
            .host
            .request_reference(self.host.config().mode, &Unobserved, None)
            .await
            .map_err(|e| TaskError::fail(e.to_string()))?;

        let rx = exec
            .execute_transient((self.producer)())
            .await
            .map_err(|e| TaskError::fail(e.to_string()))?;

        rx.await
            .map_err(|_| TaskError::fail("executor shut down before the load finished"))?
    }
}

/// Loaders only need the returned reference.
struct Unobserved;

#[async_trait]
impl ReferenceReady for Unobserved {
    async fn on_reference_ready(&self, _executor: Arc<TaskExecutor>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_returns_value_and_leaves_queue_empty() {
        let tmp = TempDir::new().unwrap();
        let host = ExecutorHost::builder(Config::with_root(tmp.path())).build();

        let loader = TaskLoader::new(host.clone(), || async { Ok::<_, TaskError>("data") });
        assert_eq!(loader.load().await, Ok("data"));
        assert_eq!(loader.load().await, Ok("data"));

        let exec = host.executor().unwrap();
        assert!(exec.is_empty().await);
        assert!(host.store().file_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_completes_while_a_consumer_is_paused() {
        let tmp = TempDir::new().unwrap();
        let host = ExecutorHost::builder(Config::with_root(tmp.path())).build();
        let exec = host
            .request_reference(crate::Mode::CallbackDependent, &Unobserved, None)
            .await
            .unwrap();
        exec.restrain().await;

        let loader = TaskLoader::new(host.clone(), || async { Ok::<_, TaskError>(7u32) });
        let res = tokio::time::timeout(std::time::Duration::from_secs(2), loader.load())
            .await
            .expect("load stalled by restrain");
        assert_eq!(res, Ok(7));
        assert!(exec.is_restrained().await);
    }

    #[tokio::test]
    async fn test_load_propagates_failure() {
        let tmp = TempDir::new().unwrap();
        let host = ExecutorHost::builder(Config::with_root(tmp.path())).build();

        let loader: TaskLoader<u32> =
            TaskLoader::new(host, || async { Err(TaskError::fail("offline")) });
        assert_eq!(loader.load().await, Err(TaskError::fail("offline")));
    }
}
