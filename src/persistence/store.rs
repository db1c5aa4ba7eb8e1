//! # Disk-backed queue directory.
//!
//! [`QueueStore`] keeps one file per queued task, named exactly by the task's
//! tag and holding its binary [`PersistedRecord`].
//!
//! ## Architecture
//! ```text
//! restore():
//!   read_dir(queue_dir) ──► decode ──► TaskRegistry::resolve ──► TaskSpec
//!                            │           └─ invalid → logged, skipped
//!                            └─► order by (seq, mtime, name)
//!
//! synchronize(queue):
//!   for task in queue, no file      ──► stamp seq ──► .staging/<tag> ──► rename ──► <tag>
//!   for file, no task with that tag ──► delete
//! ```
//!
//! ## Rules
//! - Synchronize is a full reconciliation: idempotent and independent of call order.
//! - Existing files are never rewritten; a task's record is immutable once queued.
//! - New records get a sequence stamp above every stamp seen by this store or
//!   issued before it (seeded from the wall clock), so restore preserves
//!   submission order across runs.
//! - Directory operations are serialized by an internal mutex.
//! - A failed write never touches a live file; the staging directory is ignored by restore.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{PersistenceError, RecordError};
use crate::persistence::{PersistedRecord, TaskRegistry};
use crate::tasks::TaskSpec;

/// Directory used to stage records before they are renamed into place.
const STAGING_DIR: &str = ".staging";

/// Checks that `tag` can be used verbatim as a file name in the queue directory.
pub(crate) fn validate_tag(tag: &str) -> Result<(), &'static str> {
    if tag.is_empty() {
        return Err("tag is empty");
    }
    if tag == "." || tag == ".." {
        return Err("tag is a relative path component");
    }
    if tag == STAGING_DIR {
        return Err("tag is reserved");
    }
    if tag.contains(['/', '\\', '\0']) {
        return Err("tag contains a path separator or NUL");
    }
    Ok(())
}

/// Outcome of a restore pass.
#[derive(Debug, Default)]
pub struct Restored {
    /// Reconstructed tasks in submission order.
    pub tasks: Vec<TaskSpec>,
    /// Files that could not be turned into a task.
    pub skipped: Vec<(String, RecordError)>,
}

/// Counts of files touched by one [`QueueStore::synchronize`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub written: usize,
    pub deleted: usize,
}

impl SyncReport {
    /// Returns `true` if the directory already mirrored the queue.
    pub fn is_noop(&self) -> bool {
        self.written == 0 && self.deleted == 0
    }
}

/// Disk mirror of the executor queue.
pub struct QueueStore {
    dir: PathBuf,
    registry: Arc<TaskRegistry>,
    lock: Mutex<()>,
    next_seq: AtomicU64,
}

impl QueueStore {
    /// Creates a store rooted at `dir`; the directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            lock: Mutex::new(()),
            next_seq: AtomicU64::new(clock_seq()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Reads every record in the directory and rebuilds its task.
    ///
    /// Tasks come back in submission order: by record sequence stamp, then file
    /// modification time, then name. Invalid records are logged and reported in [`Restored::skipped`]; only a
    /// failure to read the directory itself is returned as an error.
    pub async fn restore(&self) -> Result<Restored, PersistenceError> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        let files = self.list_files().await?;
        tracing::debug!(dir = %self.dir.display(), count = files.len(), "restoring tasks");

        let mut restored = Restored::default();
        let mut ordered: Vec<(u64, SystemTime, String, TaskSpec)> = Vec::new();
        for (name, path, modified) in files {
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "unreadable task file skipped");
                    continue;
                }
            };
            let spec = PersistedRecord::decode(&raw).and_then(|record| {
                let seq = record.seq;
                TaskSpec::from_record(record, &self.registry).map(|spec| (seq, spec))
            });
            match spec {
                Ok((seq, spec)) => {
                    tracing::debug!(tag = %spec.tag(), type_name = %spec.type_name(), seq, "task restored");
                    self.next_seq.fetch_max(seq.saturating_add(1), Ordering::Relaxed);
                    ordered.push((seq, modified, name, spec));
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "invalid task record skipped");
                    restored.skipped.push((name, e));
                }
            }
        }

        ordered.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
        restored.tasks = ordered.into_iter().map(|(_, _, _, spec)| spec).collect();
        Ok(restored)
    }

    /// Reconciles the directory with `queue`.
    ///
    /// Writes a record for every task without a file and deletes every file
    /// without a task. All changes are attempted; the first failure is returned.
    pub async fn synchronize(&self, queue: &[TaskSpec]) -> Result<SyncReport, PersistenceError> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        let present: HashSet<String> = self
            .list_files()
            .await?
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        let wanted: HashSet<&str> = queue.iter().map(TaskSpec::tag).collect();

        let mut report = SyncReport::default();
        let mut first_err: Option<PersistenceError> = None;

        for spec in queue {
            if present.contains(spec.tag()) {
                continue;
            }
            match self.write_record(spec).await {
                Ok(()) => {
                    report.written += 1;
                    tracing::debug!(tag = %spec.tag(), "task written to disk");
                }
                Err(e) => {
                    tracing::warn!(tag = %spec.tag(), error = %e, "task write failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        for name in present.iter().filter(|n| !wanted.contains(n.as_str())) {
            let path = self.dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::debug!(file = %name, "task deleted from disk");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "task delete failed");
                    first_err.get_or_insert(PersistenceError::io("delete", path, e));
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Returns the sorted names of all record files currently on disk.
    pub async fn file_names(&self) -> Result<Vec<String>, PersistenceError> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;
        let mut names: Vec<String> = self
            .list_files()
            .await?
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    async fn ensure_dir(&self) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::io("create_dir", &self.dir, e))
    }

    /// Lists regular files with their modification time, in directory order.
    async fn list_files(&self) -> Result<Vec<(String, PathBuf, SystemTime)>, PersistenceError> {
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| PersistenceError::io("read_dir", &self.dir, e))?;

        let mut files = Vec::new();
        loop {
            let entry = match rd.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(PersistenceError::io("read_dir", &self.dir, e)),
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "stat failed");
                    continue;
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(path = %entry.path().display(), "non utf-8 file name ignored");
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((name, entry.path(), modified));
        }
        Ok(files)
    }

    async fn write_record(&self, spec: &TaskSpec) -> Result<(), PersistenceError> {
        if validate_tag(spec.tag()).is_err() {
            return Err(PersistenceError::InvalidTag {
                tag: spec.tag().to_string(),
            });
        }

        let staging = self.dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| PersistenceError::io("create_dir", &staging, e))?;

        let tmp = staging.join(spec.tag());
        let mut record = spec.to_record();
        record.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let encoded = record.encode();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| PersistenceError::io("create", &tmp, e))?;
        file.write_all(&encoded)
            .await
            .map_err(|e| PersistenceError::io("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::io("sync", &tmp, e))?;
        drop(file);

        let dest = self.dir.join(spec.tag());
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| PersistenceError::io("rename", &dest, e))
    }
}

/// Nanoseconds since the Unix epoch; seeds the sequence of a fresh store.
fn clock_seq() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX / 2))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bundle, RemovalPolicy, TaskError, TaskFn, TaskRef};
    use tempfile::TempDir;

    fn registry() -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new().with("Noop", || {
            TaskFn::arc(|_p: Bundle| async { Ok::<_, TaskError>(()) }) as TaskRef
        }))
    }

    fn spec(tag: &str, reg: &TaskRegistry) -> TaskSpec {
        TaskSpec::from_registry(tag, "Noop", reg)
            .unwrap()
            .with_params(Bundle::new().with("tag", tag))
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("upload-1").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("..").is_err());
        assert!(validate_tag("a/b").is_err());
        assert!(validate_tag(STAGING_DIR).is_err());
    }

    #[tokio::test]
    async fn test_synchronize_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let reg = registry();
        let store = QueueStore::new(tmp.path().join("q"), Arc::clone(&reg));
        let queue = vec![spec("a", &reg), spec("b", &reg)];

        let first = store.synchronize(&queue).await.unwrap();
        assert_eq!(first, SyncReport { written: 2, deleted: 0 });
        let before = store.file_names().await.unwrap();

        let second = store.synchronize(&queue).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(store.file_names().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_synchronize_deletes_orphans_only() {
        let tmp = TempDir::new().unwrap();
        let reg = registry();
        let store = QueueStore::new(tmp.path(), Arc::clone(&reg));

        store
            .synchronize(&[spec("A", &reg), spec("B", &reg), spec("C", &reg)])
            .await
            .unwrap();
        let a_before = std::fs::read(tmp.path().join("A")).unwrap();

        let report = store
            .synchronize(&[spec("A", &reg), spec("B", &reg)])
            .await
            .unwrap();
        assert_eq!(report, SyncReport { written: 0, deleted: 1 });
        assert_eq!(store.file_names().await.unwrap(), vec!["A", "B"]);
        assert_eq!(std::fs::read(tmp.path().join("A")).unwrap(), a_before);
    }

    #[tokio::test]
    async fn test_restore_skips_corrupted_and_unknown() {
        let tmp = TempDir::new().unwrap();
        let reg = registry();
        let store = QueueStore::new(tmp.path(), Arc::clone(&reg));

        let queue = vec![
            spec("one", &reg).with_removal(RemovalPolicy::never()),
            spec("two", &reg),
            spec("three", &reg),
        ];
        store.synchronize(&queue).await.unwrap();
        std::fs::write(tmp.path().join("broken"), b"not a record").unwrap();

        let foreign = TaskSpec::new(
            "foreign",
            "Unregistered",
            TaskFn::arc(|_p: Bundle| async { Ok::<_, TaskError>(()) }),
        );
        std::fs::write(tmp.path().join("foreign"), foreign.to_record().encode()).unwrap();

        let restored = store.restore().await.unwrap();
        let mut tags: Vec<&str> = restored.tasks.iter().map(TaskSpec::tag).collect();
        tags.sort_unstable();
        assert_eq!(tags, vec!["one", "three", "two"]);
        assert_eq!(restored.skipped.len(), 2);

        let one = restored.tasks.iter().find(|t| t.tag() == "one").unwrap();
        assert_eq!(one.removal(), RemovalPolicy::never());
        assert_eq!(one.params().get_str("tag"), Some("one"));
    }

    #[tokio::test]
    async fn test_restore_follows_submission_order_not_timestamps() {
        let tmp = TempDir::new().unwrap();
        let reg = registry();
        let store = QueueStore::new(tmp.path(), Arc::clone(&reg));

        let mut queue = Vec::new();
        for tag in ["c", "b", "a"] {
            queue.push(spec(tag, &reg));
            store.synchronize(&queue).await.unwrap();
        }

        // Make the timestamps disagree with submission order.
        let base = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        for (i, tag) in ["a", "b", "c"].iter().enumerate() {
            std::fs::OpenOptions::new()
                .write(true)
                .open(tmp.path().join(tag))
                .unwrap()
                .set_modified(base + std::time::Duration::from_secs(i as u64))
                .unwrap();
        }

        let fresh = QueueStore::new(tmp.path(), Arc::clone(&reg));
        let restored = fresh.restore().await.unwrap();
        let tags: Vec<&str> = restored.tasks.iter().map(TaskSpec::tag).collect();
        assert_eq!(tags, vec!["c", "b", "a"]);

        fresh
            .synchronize(&[spec("c", &reg), spec("b", &reg), spec("a", &reg), spec("0", &reg)])
            .await
            .unwrap();
        let again = QueueStore::new(tmp.path(), Arc::clone(&reg)).restore().await.unwrap();
        let tags: Vec<&str> = again.tasks.iter().map(TaskSpec::tag).collect();
        assert_eq!(tags, vec!["c", "b", "a", "0"]);
    }

    #[tokio::test]
    async fn test_restore_ignores_staging_directory() {
        let tmp = TempDir::new().unwrap();
        let reg = registry();
        let store = QueueStore::new(tmp.path(), Arc::clone(&reg));

        std::fs::create_dir_all(tmp.path().join(STAGING_DIR)).unwrap();
        std::fs::write(tmp.path().join(STAGING_DIR).join("half"), b"TXQ1").unwrap();

        let restored = store.restore().await.unwrap();
        assert!(restored.tasks.is_empty());
        assert!(restored.skipped.is_empty());
        assert!(store.synchronize(&[]).await.unwrap().is_noop());
    }
}
