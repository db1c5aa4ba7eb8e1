//! # Demo: queue_demo
//!
//! Walks through one consumer lifecycle against a persistent queue.
//!
//! Shows how to:
//! - Register task types so queued work survives a restart.
//! - Bind a consumer through [`Attachment`] and receive callbacks on a [`DeliveryLoop`].
//! - Pause mid-task, resume with a new consumer and get the held result exactly once.
//! - Watch executor events through the built-in [`LogWriter`].
//!
//! ## Flow
//! ```text
//! ExecutorHost::build()
//!     └─► screen.resume() ──► cold start: restore <dir>/TaskExecutor
//!           ├─► submit_named("upload-1", "Upload", ...) ──► file written
//!           ├─► execute_queue() ──► worker runs Upload
//!           ├─► screen.pause()  ──► restrain (result held)
//!           └─► rotated.resume() ──► held result delivered ──► file deleted
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example queue_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use taskhold::{
    Attachment, AttachmentOptions, Bundle, Config, DeliveryContext, DeliveryLoop, ExecutorHost,
    LogWriter, RemovalPolicy, Subscribe, TaskCompleted, TaskError, TaskFn, TaskRef, TaskRegistry,
    TaskResult,
};

/// Console consumer standing in for a screen.
struct Screen {
    name: &'static str,
}

impl TaskCompleted for Screen {
    fn on_task_completed(&self, tag: &str, result: &TaskResult) {
        match result {
            Ok(()) => println!("[{}] {tag} finished", self.name),
            Err(e) => println!("[{}] {tag} failed: {e}", self.name),
        }
    }
}

fn upload() -> TaskRef {
    TaskFn::arc(|params: Bundle| async move {
        let path = params.get_str("path").unwrap_or("<none>").to_string();
        let millis = params.get_i64("millis").unwrap_or(200);
        println!("uploading {path} ...");
        tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        if path.is_empty() {
            return Err(TaskError::fail("empty path"));
        }
        Ok(())
    })
}

fn screen(
    host: &Arc<ExecutorHost>,
    name: &'static str,
) -> (Attachment<Screen>, DeliveryLoop) {
    let (ctx, lp) = DeliveryContext::channel();
    let att = Attachment::new(
        host.clone(),
        Arc::new(Screen { name }),
        ctx,
        AttachmentOptions {
            auto_execute_after_restore: true,
            ..AttachmentOptions::default()
        },
    );
    (att, lp)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let root = std::env::temp_dir().join("taskhold-demo");
    let registry = TaskRegistry::new().with("Upload", upload);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let host = ExecutorHost::builder(Config::with_root(&root))
        .with_registry(registry)
        .with_subscribers(subs)
        .build();

    let (first, mut first_loop) = screen(&host, "first");
    let exec = first.resume().await?;
    println!("queue after restore: {} task(s)", exec.len().await);

    if exec.state("upload-1").await.is_none() {
        exec.submit_named(
            "upload-1",
            "Upload",
            Bundle::new()
                .with("path", "/tmp/report.pdf")
                .with("millis", 300i64),
            RemovalPolicy::default(),
        )
        .await?;
    }
    exec.execute_queue().await;

    // Leave while the upload is still running.
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.pause().await;
    println!("first screen paused, delivered {}", first_loop.run_pending());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let (rotated, mut rotated_loop) = screen(&host, "rotated");
    rotated.resume().await?;
    rotated_loop.run_one().await;

    println!("remaining on disk: {:?}", host.store().file_names().await?);
    host.shutdown().await?;
    Ok(())
}
