//! Debounced directory watching.
//!
//! `notify` reports file system events on its own thread. They are forwarded
//! with `blocking_send` into a tokio channel and dispatched by a single task:
//!
//! ```text
//! notify thread ──blocking_send──▶ mpsc ──▶ dispatcher ──▶ Debouncer ──(delay)──▶ FileChangeHandler::file_changed
//!                                              └──────────── removal ───────────▶ FileChangeHandler::file_removed
//! ```
//!
//! Each path has at most one pending debounce task. A newer event for the
//! same path aborts the pending task and starts a fresh timer; a removal
//! aborts it and is handled right away.
//!
//! Handler calls for one path never overlap. A fired timer and a removal
//! both take the path's lock first, so a removal waits for an in-flight
//! re-index to finish and then deletes what it wrote, and a second re-index
//! of the same path starts only after the first has replaced its chunks.

use super::ingest::{Ingestor, infer_topic, is_hidden, relative_source_path};
use crate::error::Result;
use async_trait::async_trait;
use docchat_context::is_supported;
use futures::StreamExt;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Reacts to settled file changes.
#[async_trait]
pub trait FileChangeHandler: Send + Sync {
    /// The file was created or modified and has been quiet for the debounce window.
    async fn file_changed(&self, path: &Path) -> Result<()>;

    /// The file is gone.
    async fn file_removed(&self, path: &Path) -> Result<()>;
}

/// Keeps the vector store in sync with a watched directory tree.
pub struct IngestHandler {
    ingestor: Arc<Ingestor>,
    root: PathBuf,
}

impl IngestHandler {
    pub fn new(ingestor: Arc<Ingestor>, root: PathBuf) -> Self {
        Self { ingestor, root }
    }

    fn source_path(&self, path: &Path) -> String {
        relative_source_path(&self.root, path).unwrap_or_else(|| self.ingestor.source_path(path))
    }
}

#[async_trait]
impl FileChangeHandler for IngestHandler {
    async fn file_changed(&self, path: &Path) -> Result<()> {
        let topic = infer_topic(&self.root, path);
        let source_path = self.source_path(path);
        if !path.exists() {
            // Removed again before the timer fired
            self.ingestor
                .remove_source(&source_path, topic.as_deref())
                .await?;
            return Ok(());
        }
        let report = self
            .ingestor
            .reindex_source(path, &source_path, topic.as_deref())
            .await?;
        info!(
            "Reprocessed {source_path} ({} chunks replaced, {} added)",
            report.chunks_replaced, report.chunks_added
        );
        Ok(())
    }

    async fn file_removed(&self, path: &Path) -> Result<()> {
        let topic = infer_topic(&self.root, path);
        let removed = self
            .ingestor
            .remove_source(&self.source_path(path), topic.as_deref())
            .await?;
        info!("Removed {removed} chunks for deleted file {}", path.display());
        Ok(())
    }
}

/// One async lock per path, dropped from the table once nobody holds it.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }

    async fn release(&self, path: &Path, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        if locks
            .get(path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(path);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-path scheduled tasks with cancel-on-supersede.
pub struct Debouncer {
    delay: Duration,
    handler: Arc<dyn FileChangeHandler>,
    pending: Arc<Mutex<HashMap<PathBuf, PendingTask>>>,
    locks: Arc<PathLocks>,
    next_generation: AtomicU64,
}

impl Debouncer {
    pub fn new(delay: Duration, handler: Arc<dyn FileChangeHandler>) -> Self {
        Self {
            delay,
            handler,
            pending: Arc::new(Mutex::new(HashMap::new())),
            locks: Arc::new(PathLocks::default()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run `file_changed(path)` once `path` has been quiet for the delay.
    pub async fn schedule(&self, path: PathBuf) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(&path) {
            previous.handle.abort();
            debug!("Superseded pending change for {}", path.display());
        }

        let delay = self.delay;
        let handler = Arc::clone(&self.handler);
        let table = Arc::clone(&self.pending);
        let locks = Arc::clone(&self.locks);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let guard = locks.acquire(&task_path).await;
            // Leave the table once the path is ours, so a newer event starts
            // a fresh pass after this one instead of aborting it halfway.
            let current = {
                let mut pending = table.lock().await;
                let current = pending
                    .get(&task_path)
                    .is_some_and(|task| task.generation == generation);
                if current {
                    pending.remove(&task_path);
                }
                current
            };
            if !current {
                locks.release(&task_path, guard).await;
                return;
            }
            if let Err(e) = handler.file_changed(&task_path).await {
                error!("Failed to process {}: {e}", task_path.display());
            }
            locks.release(&task_path, guard).await;
        });

        pending.insert(path, PendingTask { generation, handle });
    }

    /// Cancel any pending change for `path`, then run `file_removed(path)`
    /// once no other handler call for it is in flight.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        self.cancel(path).await;
        let guard = self.locks.acquire(path).await;
        let result = self.handler.file_removed(path).await;
        self.locks.release(path, guard).await;
        result
    }

    /// Abort the pending task for `path`. Returns whether one existed.
    pub async fn cancel(&self, path: &Path) -> bool {
        match self.pending.lock().await.remove(path) {
            Some(task) => {
                task.handle.abort();
                debug!("Cancelled pending change for {}", path.display());
                true
            }
            None => false,
        }
    }

    pub async fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().await.contains_key(path)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn abort_all(&self) {
        for (_, task) in self.pending.lock().await.drain() {
            task.handle.abort();
        }
    }
}

/// A file event after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Changed(path) | FileEvent::Removed(path) => path,
        }
    }

    /// Map a notify event to per-path events.
    ///
    /// Renames and platform-specific modify kinds are resolved by checking
    /// whether the path still exists.
    pub fn from_notify(event: &notify::Event) -> Vec<FileEvent> {
        match event.kind {
            EventKind::Remove(_) => event.paths.iter().cloned().map(FileEvent::Removed).collect(),
            EventKind::Create(_) | EventKind::Modify(_) => {
                if matches!(event.kind, EventKind::Modify(notify::event::ModifyKind::Metadata(_))) {
                    return Vec::new();
                }
                event
                    .paths
                    .iter()
                    .map(|path| {
                        if path.exists() {
                            FileEvent::Changed(path.clone())
                        } else {
                            FileEvent::Removed(path.clone())
                        }
                    })
                    .collect()
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

/// Settings for [`DocumentWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    pub debounce: Duration,
    pub channel_capacity: usize,
}

impl WatcherConfig {
    pub fn new<P: Into<PathBuf>>(watch_dir: P) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            debounce: Duration::from_millis(1000),
            channel_capacity: 128,
        }
    }

    pub fn with_debounce_ms(self, millis: u64) -> Self {
        Self {
            debounce: Duration::from_millis(millis),
            ..self
        }
    }

    pub fn with_channel_capacity(self, capacity: usize) -> Self {
        Self {
            channel_capacity: capacity.max(1),
            ..self
        }
    }
}

/// Whether an event for `path` should reach the handler.
pub fn should_handle(root: &Path, event: &FileEvent) -> bool {
    let path = event.path();
    if is_hidden(root, path) || !is_supported(path) {
        return false;
    }
    match event {
        FileEvent::Changed(path) => !path.is_dir(),
        FileEvent::Removed(_) => true,
    }
}

/// Watches a directory tree and feeds settled changes to a handler.
pub struct DocumentWatcher {
    root: PathBuf,
    debouncer: Arc<Debouncer>,
    // Dropping the watcher closes the channel and ends the dispatcher.
    watcher: RecommendedWatcher,
    dispatcher: JoinHandle<()>,
}

impl DocumentWatcher {
    /// Start watching `config.watch_dir` recursively, creating it if missing.
    pub async fn start(config: WatcherConfig, handler: Arc<dyn FileChangeHandler>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.watch_dir).await?;
        let root = tokio::fs::canonicalize(&config.watch_dir).await?;

        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);
        let debouncer = Arc::new(Debouncer::new(config.debounce, handler));

        // The dispatcher must exist before events arrive or blocking_send stalls
        let dispatcher = tokio::spawn(Self::dispatch(root.clone(), events_rx, Arc::clone(&debouncer)));

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(&event) {
                        // Runs on notify's thread, outside the runtime
                        if events_tx.blocking_send(file_event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!("File watch error: {e}"),
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(
            "Watching {} (debounce {} ms)",
            root.display(),
            config.debounce.as_millis()
        );
        Ok(Self {
            root,
            debouncer,
            watcher,
            dispatcher,
        })
    }

    async fn dispatch(
        root: PathBuf,
        events_rx: mpsc::Receiver<FileEvent>,
        debouncer: Arc<Debouncer>,
    ) {
        let root = &root;
        let debouncer = &debouncer;
        ReceiverStream::new(events_rx)
            .filter(|event| std::future::ready(should_handle(root, event)))
            .for_each(|event| async move {
                match event {
                    FileEvent::Changed(path) => {
                        debug!("Change detected: {}", path.display());
                        debouncer.schedule(path).await;
                    }
                    FileEvent::Removed(path) => {
                        if let Err(e) = debouncer.remove(&path).await {
                            error!("Failed to remove {}: {e}", path.display());
                        }
                    }
                }
            })
            .await;
        debug!("Watch event stream closed");
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    /// Stop watching and abort pending debounce tasks.
    pub async fn shutdown(self) {
        drop(self.watcher);
        self.dispatcher.abort();
        self.debouncer.abort_all().await;
        info!("Stopped watching {}", self.root.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::time::sleep;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingHandler {
        changed: StdMutex<Vec<PathBuf>>,
        removed: StdMutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl FileChangeHandler for RecordingHandler {
        async fn file_changed(&self, path: &Path) -> Result<()> {
            self.changed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        async fn file_removed(&self, path: &Path) -> Result<()> {
            self.removed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_repeated_events_collapse_into_one() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(100), handler.clone());
        let path = PathBuf::from("Docs/notes.txt");

        for _ in 0..5 {
            debouncer.schedule(path.clone()).await;
            sleep(Duration::from_millis(10)).await;
        }
        assert!(debouncer.is_pending(&path).await);
        assert!(handler.changed.lock().unwrap().is_empty());

        sleep(Duration::from_millis(300)).await;
        assert_eq!(*handler.changed.lock().unwrap(), vec![path.clone()]);
        assert!(!debouncer.is_pending(&path).await);
    }

    #[tokio::test]
    async fn test_distinct_paths_debounce_independently() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(50), handler.clone());

        debouncer.schedule(PathBuf::from("a.txt")).await;
        debouncer.schedule(PathBuf::from("b.txt")).await;
        assert_eq!(debouncer.pending_count().await, 2);

        sleep(Duration::from_millis(250)).await;
        let mut changed = handler.changed.lock().unwrap().clone();
        changed.sort();
        assert_eq!(changed, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_task() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(50), handler.clone());
        let path = PathBuf::from("gone.txt");

        debouncer.schedule(path.clone()).await;
        assert!(debouncer.cancel(&path).await);
        assert!(!debouncer.cancel(&path).await);

        sleep(Duration::from_millis(200)).await;
        assert!(handler.changed.lock().unwrap().is_empty());
    }

    /// Records the order of calls and how many ran at once.
    #[derive(Default)]
    struct SlowHandler {
        active: AtomicU64,
        peak: AtomicU64,
        log: StdMutex<Vec<&'static str>>,
    }

    impl SlowHandler {
        fn enter(&self, event: &'static str) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.log.lock().unwrap().push(event);
        }

        fn leave(&self, event: &'static str) {
            self.log.lock().unwrap().push(event);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FileChangeHandler for SlowHandler {
        async fn file_changed(&self, _path: &Path) -> Result<()> {
            self.enter("change started");
            sleep(Duration::from_millis(200)).await;
            self.leave("change finished");
            Ok(())
        }

        async fn file_removed(&self, _path: &Path) -> Result<()> {
            self.enter("remove started");
            self.leave("remove finished");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_change_during_in_flight_change_runs_after_it() -> anyhow::Result<()> {
        let handler = Arc::new(SlowHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(50), handler.clone());
        let path = PathBuf::from("Docs/notes.txt");

        debouncer.schedule(path.clone()).await;
        sleep(Duration::from_millis(120)).await;
        // The first pass is running and no longer pending
        assert!(!debouncer.is_pending(&path).await);
        debouncer.schedule(path.clone()).await;

        sleep(Duration::from_millis(700)).await;
        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        assert_eq!(
            *handler.log.lock().unwrap(),
            vec![
                "change started",
                "change finished",
                "change started",
                "change finished"
            ]
        );
        assert_eq!(debouncer.locks.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_waits_for_in_flight_change() -> anyhow::Result<()> {
        let handler = Arc::new(SlowHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(50), handler.clone());
        let path = PathBuf::from("Docs/notes.txt");

        debouncer.schedule(path.clone()).await;
        sleep(Duration::from_millis(120)).await;
        debouncer.remove(&path).await?;

        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        assert_eq!(
            *handler.log.lock().unwrap(),
            vec![
                "change started",
                "change finished",
                "remove started",
                "remove finished"
            ]
        );
        assert_eq!(debouncer.locks.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_cancels_pending_change() -> anyhow::Result<()> {
        let handler = Arc::new(SlowHandler::default());
        let debouncer = Debouncer::new(Duration::from_millis(100), handler.clone());
        let path = PathBuf::from("Docs/notes.txt");

        debouncer.schedule(path.clone()).await;
        debouncer.remove(&path).await?;
        sleep(Duration::from_millis(250)).await;

        assert!(!debouncer.is_pending(&path).await);
        assert_eq!(
            *handler.log.lock().unwrap(),
            vec!["remove started", "remove finished"]
        );
        Ok(())
    }

    #[test]
    fn test_should_handle_filters_paths() {
        let root = Path::new("/watch");
        assert!(should_handle(
            root,
            &FileEvent::Removed(PathBuf::from("/watch/Physics/waves.pdf"))
        ));
        assert!(!should_handle(
            root,
            &FileEvent::Removed(PathBuf::from("/watch/Physics/waves.docx"))
        ));
        assert!(!should_handle(
            root,
            &FileEvent::Removed(PathBuf::from("/watch/.trash/waves.pdf"))
        ));
    }

    #[test]
    fn test_from_notify_classifies_events() {
        use notify::event::{AccessKind, CreateKind, RemoveKind};

        let missing = PathBuf::from("/definitely/not/here.txt");
        let removed =
            notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(missing.clone());
        assert_eq!(
            FileEvent::from_notify(&removed),
            vec![FileEvent::Removed(missing.clone())]
        );

        // A create for a path that no longer exists resolves to a removal
        let created =
            notify::Event::new(EventKind::Create(CreateKind::File)).add_path(missing.clone());
        assert_eq!(
            FileEvent::from_notify(&created),
            vec![FileEvent::Removed(missing.clone())]
        );

        let accessed = notify::Event::new(EventKind::Access(AccessKind::Any)).add_path(missing);
        assert!(FileEvent::from_notify(&accessed).is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_watcher_reports_new_and_deleted_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let handler = Arc::new(RecordingHandler::default());
        let config = WatcherConfig::new(dir.path()).with_debounce_ms(100);
        let watcher = DocumentWatcher::start(config, handler.clone()).await?;
        let path = watcher.root().join("notes.txt");

        tokio::fs::write(&path, "The sky is blue.").await?;
        let mut seen = false;
        for _ in 0..50 {
            sleep(Duration::from_millis(100)).await;
            if handler.changed.lock().unwrap().contains(&path) {
                seen = true;
                break;
            }
        }
        assert!(seen, "change for {} was never reported", path.display());

        tokio::fs::remove_file(&path).await?;
        let mut removed = false;
        for _ in 0..50 {
            sleep(Duration::from_millis(100)).await;
            if handler.removed.lock().unwrap().contains(&path) {
                removed = true;
                break;
            }
        }
        assert!(removed, "removal of {} was never reported", path.display());

        watcher.shutdown().await;
        Ok(())
    }
}
