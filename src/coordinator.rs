//! Per-file write scheduling.
//!
//! [`WriteCoordinator::write`] never blocks: it records the new value and, if no write for
//! that file is running, spawns a worker task for it. A worker drains its file's queue one
//! write at a time, so there is at most one rewrite in flight per file, and writes that
//! arrive while one is running collapse into a single follow-up carrying the latest value.
//! Reads see pending values before they hit the disk.
//!
//! ```rust,no_run
//! use eyephoto_meta::config::WritePolicy;
//! use eyephoto_meta::coordinator::WriteCoordinator;
//! use eyephoto_meta::reconciler::JpegMetadataStore;
//! use eyephoto_meta::record::MetadataRecord;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = WriteCoordinator::new(
//!         JpegMetadataStore,
//!         WritePolicy::PacketAndTags,
//!         tokio::runtime::Handle::current(),
//!     );
//!     let path = Path::new("eye.jpg");
//!
//!     let mut record = coordinator.read(path).unwrap_or_default();
//!     record.person = Some("Jane Doe".into());
//!     coordinator.write(path, record);
//!
//!     coordinator.flush(path).await;
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};

use crate::config::{SharedConfig, WritePolicy};
use crate::error::{MetadataError, Result};
use crate::reconciler::WriteOutcome;
use crate::record::MetadataRecord;

/// Capacity of the completion event channel. Slow subscribers skip events past this.
const EVENT_CAPACITY: usize = 64;

/// Where the coordinator gets the write policy, asked again before every write.
pub trait PolicySource: Send + Sync + 'static {
    fn write_policy(&self) -> WritePolicy;
}

impl PolicySource for WritePolicy {
    fn write_policy(&self) -> WritePolicy {
        *self
    }
}

impl PolicySource for SharedConfig {
    fn write_policy(&self) -> WritePolicy {
        self.snapshot().write_policy
    }
}

/// The storage the coordinator schedules writes against. Both calls block.
pub trait MetadataBackend: Send + Sync + 'static {
    fn read(&self, path: &Path) -> Option<MetadataRecord>;

    fn write(&self, path: &Path, record: &MetadataRecord, policy: WritePolicy)
    -> Result<WriteOutcome>;
}

/// Published after every background write attempt.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub path: PathBuf,
    pub record: MetadataRecord,
    pub result: std::result::Result<WriteOutcome, Arc<MetadataError>>,
}

#[derive(Default)]
struct PendingWrites {
    /// The value each running worker is writing or about to write.
    in_flight: HashMap<PathBuf, MetadataRecord>,
    /// The next value per file. Only present for files that are also in `in_flight`.
    queued: HashMap<PathBuf, MetadataRecord>,
}

struct Inner<B> {
    backend: B,
    policy: Box<dyn PolicySource>,
    pending: Mutex<PendingWrites>,
    idle: Notify,
    events: broadcast::Sender<WriteEvent>,
    runtime: Handle,
    /// Canonical key per path as passed in, so the caller's thread touches the filesystem
    /// once per distinct path rather than on every call.
    keys: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl<B> Inner<B> {
    fn lock(&self) -> MutexGuard<'_, PendingWrites> {
        // The bookkeeping stays consistent even if a holder panicked: every critical
        // section is a handful of map operations.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Files are identified by canonical absolute path. A file that does not exist (yet)
    /// falls back to its absolute path and is resolved again next time.
    fn key(&self, path: &Path) -> PathBuf {
        let cached = self
            .keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned();
        if let Some(key) = cached {
            return key;
        }

        match std::fs::canonicalize(path) {
            Ok(key) => {
                self.keys
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(path.to_path_buf(), key.clone());
                key
            }
            Err(_) => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        }
    }
}

/// Coalescing, non-blocking metadata writer with read-through of pending values.
pub struct WriteCoordinator<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for WriteCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: MetadataBackend> WriteCoordinator<B> {
    /// Worker tasks and blocking writes run on `runtime`.
    pub fn new(backend: B, policy: impl PolicySource, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                policy: Box::new(policy),
                pending: Mutex::new(PendingWrites::default()),
                idle: Notify::new(),
                events,
                runtime,
                keys: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The latest value for `path`: a pending write if there is one, else the stored record.
    pub fn read(&self, path: &Path) -> Option<MetadataRecord> {
        let key = self.inner.key(path);
        {
            let pending = self.inner.lock();
            let pending_record = pending.queued.get(&key).or_else(|| pending.in_flight.get(&key));
            if let Some(record) = pending_record {
                return Some(record.clone());
            }
        }
        self.inner.backend.read(&key)
    }

    /// Schedule `record` to be written to `path`. Returns immediately.
    pub fn write(&self, path: &Path, record: MetadataRecord) {
        let key = self.inner.key(path);
        {
            let mut pending = self.inner.lock();
            if pending.in_flight.contains_key(&key) {
                log::debug!("Queueing write for {} behind the running one", key.display());
                pending.queued.insert(key, record);
                return;
            }
            pending.in_flight.insert(key.clone(), record.clone());
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(run_worker(inner, key, record));
    }

    /// Receive a [`WriteEvent`] for every write attempted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        let key = self.inner.key(path);
        self.inner.lock().in_flight.contains_key(&key)
    }

    /// Wait until nothing is pending for `path`.
    pub async fn flush(&self, path: &Path) {
        let key = self.inner.key(path);
        self.wait_until(|pending| !pending.in_flight.contains_key(&key))
            .await;
    }

    /// Wait until no write is pending for any file.
    pub async fn flush_all(&self) {
        self.wait_until(|pending| pending.in_flight.is_empty()).await;
    }

    async fn wait_until(&self, done: impl Fn(&PendingWrites) -> bool) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion between the check and the await
            // still wakes us.
            notified.as_mut().enable();
            if done(&self.inner.lock()) {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker<B: MetadataBackend>(
    inner: Arc<Inner<B>>,
    path: PathBuf,
    mut record: MetadataRecord,
) {
    loop {
        let policy = inner.policy.write_policy();

        let task = {
            let shared = Arc::clone(&inner);
            let path = path.clone();
            let record = record.clone();
            inner
                .runtime
                .spawn_blocking(move || shared.backend.write(&path, &record, policy))
        };
        let result = match task.await {
            Ok(result) => result,
            Err(source) => Err(MetadataError::WriteTask {
                path: path.clone(),
                source,
            }),
        };

        match &result {
            Ok(outcome) => log::debug!("Write to {} finished: {outcome:?}", path.display()),
            Err(e) => log::error!("Failed to write metadata to {}: {e}", path.display()),
        }
        // No subscribers is fine.
        let _ = inner.events.send(WriteEvent {
            path: path.clone(),
            record,
            result: result.map_err(Arc::new),
        });

        let next = {
            let mut pending = inner.lock();
            match pending.queued.remove(&path) {
                Some(next) => {
                    pending.in_flight.insert(path.clone(), next.clone());
                    Some(next)
                }
                None => {
                    pending.in_flight.remove(&path);
                    None
                }
            }
        };

        match next {
            Some(next) => record = next,
            None => {
                inner.idle.notify_waiters();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{JpegMetadataStore, read_record};
    use crate::test_support::write_sample_jpeg;
    use std::sync::Condvar;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Blocks backend writes until opened.
    struct Gate {
        open: Mutex<bool>,
        cond: Condvar,
    }

    impl Gate {
        fn new(open: bool) -> Self {
            Self {
                open: Mutex::new(open),
                cond: Condvar::new(),
            }
        }

        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cond.wait(open).unwrap();
            }
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.cond.notify_all();
        }
    }

    struct FakeBackend {
        gate: Gate,
        stored: Mutex<HashMap<PathBuf, MetadataRecord>>,
        writes: Mutex<Vec<(PathBuf, MetadataRecord, WritePolicy)>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
    }

    impl FakeBackend {
        fn new(open: bool) -> Self {
            Self {
                gate: Gate::new(open),
                stored: Mutex::new(HashMap::new()),
                writes: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    impl MetadataBackend for Arc<FakeBackend> {
        fn read(&self, path: &Path) -> Option<MetadataRecord> {
            self.stored.lock().unwrap().get(path).cloned()
        }

        fn write(
            &self,
            path: &Path,
            record: &MetadataRecord,
            policy: WritePolicy,
        ) -> Result<WriteOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.gate.wait();
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.writes
                .lock()
                .unwrap()
                .push((path.to_path_buf(), record.clone(), policy));
            match record.title.as_deref() {
                Some("panic") => panic!("backend exploded"),
                Some("fail") => Err(MetadataError::io(
                    path,
                    std::io::Error::other("disk full"),
                )),
                _ => {
                    self.stored
                        .lock()
                        .unwrap()
                        .insert(path.to_path_buf(), record.clone());
                    Ok(WriteOutcome::Written { tags: true })
                }
            }
        }
    }

    fn titled(title: &str) -> MetadataRecord {
        MetadataRecord {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn coordinator(
        backend: &Arc<FakeBackend>,
    ) -> WriteCoordinator<Arc<FakeBackend>> {
        WriteCoordinator::new(
            Arc::clone(backend),
            WritePolicy::PacketAndTags,
            Handle::current(),
        )
    }

    fn written_titles(backend: &FakeBackend) -> Vec<String> {
        backend
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, r, _)| r.title.clone())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_coalesce_to_latest_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        let backend = Arc::new(FakeBackend::new(false));
        let coordinator = coordinator(&backend);

        coordinator.write(&path, titled("r1"));
        coordinator.write(&path, titled("r2"));
        coordinator.write(&path, titled("r3"));
        assert!(coordinator.is_pending(&path));

        backend.gate.open();
        coordinator.flush(&path).await;

        assert_eq!(written_titles(&backend), ["r1", "r3"]);
        assert!(!coordinator.is_pending(&path));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_see_pending_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        let backend = Arc::new(FakeBackend::new(false));
        let coordinator = coordinator(&backend);

        assert_eq!(coordinator.read(&path), None);
        coordinator.write(&path, titled("r1"));
        assert_eq!(coordinator.read(&path), Some(titled("r1")));
        coordinator.write(&path, titled("r2"));
        assert_eq!(coordinator.read(&path), Some(titled("r2")));

        backend.gate.open();
        coordinator.flush(&path).await;
        assert_eq!(coordinator.read(&path), Some(titled("r2")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn at_most_one_write_per_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        let mut backend = FakeBackend::new(true);
        backend.delay = Duration::from_millis(5);
        let backend = Arc::new(backend);
        let coordinator = coordinator(&backend);

        for i in 0..20 {
            coordinator.write(&path, titled(&format!("r{i}")));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        coordinator.flush_all().await;

        assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(written_titles(&backend).last().map(String::as_str), Some("r19"));
        assert_eq!(coordinator.read(&path), Some(titled("r19")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn different_files_write_in_parallel() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(false));
        let coordinator = coordinator(&backend);

        coordinator.write(&dir.path().join("a.jpg"), titled("a"));
        coordinator.write(&dir.path().join("b.jpg"), titled("b"));

        let both_running = async {
            while backend.active.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        let started = tokio::time::timeout(Duration::from_secs(5), both_running).await;
        backend.gate.open();
        coordinator.flush_all().await;

        assert!(started.is_ok(), "writes to different files did not overlap");
        assert_eq!(backend.writes.lock().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_reported_and_do_not_block_later_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        let backend = Arc::new(FakeBackend::new(true));
        let coordinator = coordinator(&backend);
        let mut events = coordinator.subscribe();

        coordinator.write(&path, titled("fail"));
        coordinator.flush(&path).await;
        coordinator.write(&path, titled("panic"));
        coordinator.flush(&path).await;
        coordinator.write(&path, titled("ok"));
        coordinator.flush(&path).await;

        let error_of = |event: &WriteEvent| event.result.as_ref().err().map(Arc::clone);
        let first = events.recv().await.unwrap();
        assert!(matches!(
            error_of(&first).as_deref(),
            Some(MetadataError::Io { .. })
        ));
        let second = events.recv().await.unwrap();
        assert!(matches!(
            error_of(&second).as_deref(),
            Some(MetadataError::WriteTask { .. })
        ));
        let third = events.recv().await.unwrap();
        assert_eq!(third.record, titled("ok"));
        assert_eq!(third.result.unwrap(), WriteOutcome::Written { tags: true });

        assert_eq!(coordinator.read(&path), Some(titled("ok")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn policy_is_read_before_every_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        let backend = Arc::new(FakeBackend::new(true));
        let config = SharedConfig::default();
        let coordinator =
            WriteCoordinator::new(Arc::clone(&backend), config.clone(), Handle::current());

        coordinator.write(&path, titled("before"));
        coordinator.flush(&path).await;
        config.update(|c| c.write_policy = WritePolicy::PacketOnly);
        coordinator.write(&path, titled("after"));
        coordinator.flush(&path).await;

        let policies: Vec<_> = backend
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, policy)| *policy)
            .collect();
        assert_eq!(policies, [WritePolicy::NoWrite, WritePolicy::PacketOnly]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn equivalent_paths_share_one_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eye.jpg");
        std::fs::write(&path, b"x").unwrap();
        let dotted = dir.path().join(".").join("eye.jpg");
        let backend = Arc::new(FakeBackend::new(false));
        let coordinator = coordinator(&backend);

        coordinator.write(&path, titled("r1"));
        assert!(coordinator.is_pending(&dotted));
        assert_eq!(coordinator.read(&dotted), Some(titled("r1")));

        backend.gate.open();
        coordinator.flush(&dotted).await;
        assert!(!coordinator.is_pending(&path));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn a_path_is_resolved_once() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("eye.jpg");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link.jpg");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let backend = Arc::new(FakeBackend::new(false));
        let coordinator = coordinator(&backend);

        coordinator.write(&link, titled("r1"));
        assert!(coordinator.is_pending(&target));

        // Still keyed by the file it pointed at when first seen.
        std::fs::remove_file(&link).unwrap();
        assert!(coordinator.is_pending(&link));

        backend.gate.open();
        coordinator.flush(&link).await;
        let written: Vec<PathBuf> = backend
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _, _)| path.clone())
            .collect();
        assert_eq!(written, [std::fs::canonicalize(&target).unwrap()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn latest_record_lands_in_a_real_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = write_sample_jpeg(dir.path(), "eye.jpg");
        let coordinator =
            WriteCoordinator::new(JpegMetadataStore, WritePolicy::PacketAndTags, Handle::current());
        let mut events = coordinator.subscribe();

        let r1 = MetadataRecord {
            title: Some("Right eye".into()),
            x_center: Some(0.5),
            ..Default::default()
        };
        let r2 = MetadataRecord {
            title: Some("Left eye".into()),
            person: Some("Jane Doe".into()),
            x_center: Some(0.25),
            ..Default::default()
        };
        coordinator.write(&path, r1);
        coordinator.write(&path, r2.clone());
        assert_eq!(coordinator.read(&path), Some(r2.clone()));

        coordinator.flush(&path).await;
        assert_eq!(read_record(&path), Some(r2.clone()));
        assert_eq!(coordinator.read(&path), Some(r2.clone()));

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            assert!(event.result.is_ok(), "{:?}", event.result);
            last = Some(event.record);
        }
        assert_eq!(last, Some(r2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_of_idle_file_returns_immediately() {
        let backend = Arc::new(FakeBackend::new(true));
        let coordinator = coordinator(&backend);
        tokio::time::timeout(Duration::from_secs(1), coordinator.flush(Path::new("idle.jpg")))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), coordinator.flush_all())
            .await
            .unwrap();
    }
}
