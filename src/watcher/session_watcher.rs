//! Live multi-file tailing with notify integration.
//!
//! A single background task owns the tail loop. It wakes on debounced OS
//! change notifications, on a fixed poll interval, or on shutdown, and
//! emits one [`WatchEvent`] per complete line appended to a tracked file.

use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use super::tailer::LogTailer;
use crate::config::WatcherConfig;
use crate::transcript::RawRecord;

type FileDebouncer = Debouncer<RecommendedWatcher, RecommendedCache>;

/// One complete line appended to a tracked file.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub record: RawRecord,
}

/// Receiving ends of the watcher's queues.
#[derive(Debug)]
pub struct WatchReceivers {
    /// New records, in append order per file.
    pub events: mpsc::Receiver<WatchEvent>,
    /// Asynchronous, non-fatal errors. Dropped when the queue is full.
    pub errors: mpsc::Receiver<WatcherError>,
}

/// Failure condition last reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Truncated,
    Unreadable,
}

/// Per-file tail state, private to the watcher.
#[derive(Debug, Default)]
struct TailState {
    offset: u64,
    /// Cleared by the next successful read.
    failing: Option<Failure>,
}

type TailTable = Arc<Mutex<HashMap<PathBuf, TailState>>>;

struct NotifyState {
    debouncer: FileDebouncer,
    dirs: HashSet<PathBuf>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key under which a file is tracked.
///
/// The directory part is resolved through symlinks and `..`, so different
/// spellings of one file share a key. The file itself need not exist.
fn tracking_key(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let (Some(dir), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return Ok(absolute);
    };
    match std::fs::canonicalize(dir) {
        Ok(dir) => Ok(dir.join(name)),
        Err(_) => Ok(lexically_normalized(&absolute)),
    }
}

/// Drop `.` and fold `..` without touching the filesystem.
fn lexically_normalized(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Tails a growing set of session log files.
///
/// Files are tracked from registration until [`close`](Self::close).
pub struct SessionWatcher {
    tails: TailTable,
    notify: Mutex<NotifyState>,
    /// Serialises registrations so a path is only ever read and inserted once.
    registering: tokio::sync::Mutex<()>,
    events_tx: mpsc::Sender<WatchEvent>,
    errors_tx: mpsc::Sender<WatcherError>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    replay_existing: bool,
}

impl SessionWatcher {
    /// Create a watcher and start its tail loop.
    ///
    /// Returns the watcher and the receivers for its event and error queues.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS file watcher cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: &WatcherConfig) -> Result<(Self, WatchReceivers), WatcherError> {
        let (events_tx, events) = mpsc::channel(config.event_capacity());
        let (errors_tx, errors) = mpsc::channel(config.error_capacity());
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let debouncer = new_debouncer(config.debounce(), None, move |result| {
            let _ = notify_tx.send(result);
        })?;

        let tails: TailTable = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let tail_loop = TailLoop {
            tails: Arc::clone(&tails),
            events_tx: events_tx.clone(),
            errors_tx: errors_tx.clone(),
            notify_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(tail_loop.run(config.poll_interval()));

        Ok((
            Self {
                tails,
                notify: Mutex::new(NotifyState {
                    debouncer,
                    dirs: HashSet::new(),
                }),
                registering: tokio::sync::Mutex::new(()),
                events_tx,
                errors_tx,
                cancel,
                task: Some(task),
                replay_existing: config.replay_existing,
            },
            WatchReceivers { events, errors },
        ))
    }

    /// Start tracking a file. Registering a tracked file again, under any
    /// spelling of its path, is a no-op.
    ///
    /// The file's current content is read once to establish the starting
    /// offset; it is discarded unless `replay_existing` is set, in which
    /// case it is delivered as events first. A file that does not exist yet
    /// starts at offset 0.
    ///
    /// With `replay_existing`, this waits for queue space, so the event
    /// receiver must be drained concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher is closed or the OS watch on the
    /// file's directory cannot be registered. Read failures go to the error
    /// queue instead.
    pub async fn watch(&self, path: impl AsRef<Path>) -> Result<(), WatcherError> {
        if self.cancel.is_cancelled() {
            return Err(WatcherError::Closed);
        }
        let path = tracking_key(path.as_ref())?;

        let _registering = self.registering.lock().await;
        if lock(&self.tails).contains_key(&path) {
            return Ok(());
        }

        self.watch_parent(&path)?;

        let mut tailer = LogTailer::new(path.clone());
        let existing = match tailer.read_new_records().await {
            Ok(records) => records,
            Err(e) => {
                report(&self.errors_tx, e);
                Vec::new()
            }
        };

        if self.replay_existing {
            for tailed in existing {
                let event = WatchEvent {
                    path: path.clone(),
                    record: tailed.record,
                };
                if deliver(&self.events_tx, &self.cancel, event).await.is_break() {
                    return Err(WatcherError::Closed);
                }
            }
        }

        tracing::debug!(
            path = %path.display(),
            offset = tailer.offset(),
            "Tracking session log"
        );
        lock(&self.tails).insert(
            path,
            TailState {
                offset: tailer.offset(),
                failing: None,
            },
        );
        Ok(())
    }

    /// Whether `path` is tracked.
    #[must_use]
    pub fn is_watching(&self, path: &Path) -> bool {
        tracking_key(path).is_ok_and(|key| lock(&self.tails).contains_key(&key))
    }

    /// Number of tracked files.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        lock(&self.tails).len()
    }

    /// Stop the tail loop and release the OS watches.
    ///
    /// Events already queued remain readable; no new ones are produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the tail loop task panicked.
    pub async fn close(mut self) -> Result<(), WatcherError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        tracing::debug!("Session watcher closed");
        Ok(())
    }

    /// OS-watch the file's directory, so files created later are noticed.
    fn watch_parent(&self, path: &Path) -> Result<(), WatcherError> {
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        let mut notify = lock(&self.notify);
        if notify.dirs.contains(dir) {
            return Ok(());
        }
        if !dir.is_dir() {
            tracing::debug!(
                dir = %dir.display(),
                "Directory missing, relying on polling"
            );
            return Ok(());
        }
        notify.debouncer.watch(dir, RecursiveMode::NonRecursive)?;
        notify.dirs.insert(dir.to_path_buf());
        Ok(())
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Push an event, giving up if shutdown fires first.
async fn deliver(
    events_tx: &mpsc::Sender<WatchEvent>,
    cancel: &CancellationToken,
    event: WatchEvent,
) -> ControlFlow<()> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => ControlFlow::Break(()),
        sent = events_tx.send(event) => {
            if sent.is_err() {
                tracing::trace!("Event receiver dropped");
            }
            ControlFlow::Continue(())
        }
    }
}

/// Best-effort error delivery.
fn report(errors_tx: &mpsc::Sender<WatcherError>, error: WatcherError) {
    match errors_tx.try_send(error) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(error)) => {
            tracing::warn!(error = %error, "Error queue full, dropping error");
        }
    }
}

/// The background loop and the state it owns.
struct TailLoop {
    tails: TailTable,
    events_tx: mpsc::Sender<WatchEvent>,
    errors_tx: mpsc::Sender<WatcherError>,
    notify_rx: mpsc::UnboundedReceiver<DebounceEventResult>,
    cancel: CancellationToken,
}

impl TailLoop {
    async fn run(mut self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(poll_ms = poll_interval.as_millis(), "Tail loop started");

        loop {
            let flow = tokio::select! {
                biased;

                () = self.cancel.cancelled() => ControlFlow::Break(()),
                Some(result) = self.notify_rx.recv() => self.on_notify(result).await,
                _ = ticker.tick() => self.sweep().await,
            };
            if flow.is_break() {
                break;
            }
        }

        tracing::debug!("Tail loop stopped");
    }

    async fn on_notify(&mut self, result: DebounceEventResult) -> ControlFlow<()> {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for error in errors {
                    report(&self.errors_tx, WatcherError::Notify(error));
                }
                return ControlFlow::Continue(());
            }
        };

        let mut changed: Vec<PathBuf> = Vec::new();
        for event in &events {
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            ) {
                continue;
            }
            for path in &event.paths {
                if !changed.contains(path) {
                    changed.push(path.clone());
                }
            }
        }
        changed.retain(|path| lock(&self.tails).contains_key(path));

        for path in changed {
            if self.service(&path).await.is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Re-read every tracked file.
    async fn sweep(&mut self) -> ControlFlow<()> {
        let paths: Vec<PathBuf> = lock(&self.tails).keys().cloned().collect();
        for path in paths {
            if self.service(&path).await.is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Deliver everything appended to `path` since its stored offset.
    async fn service(&mut self, path: &Path) -> ControlFlow<()> {
        let Some(offset) = lock(&self.tails).get(path).map(|state| state.offset) else {
            return ControlFlow::Continue(());
        };

        let mut tailer = LogTailer::with_offset(path.to_path_buf(), offset);
        match tailer.read_new_records().await {
            Ok(records) => {
                if !records.is_empty() {
                    tracing::trace!(
                        path = %path.display(),
                        count = records.len(),
                        "Read appended records"
                    );
                }
                for tailed in records {
                    let event = WatchEvent {
                        path: path.to_path_buf(),
                        record: tailed.record,
                    };
                    if deliver(&self.events_tx, &self.cancel, event)
                        .await
                        .is_break()
                    {
                        return ControlFlow::Break(());
                    }
                    self.advance(path, tailed.end_offset, None);
                }
                self.advance(path, tailer.offset(), None);
            }
            Err(e @ WatcherError::FileTruncated { .. }) => {
                if self.advance(path, offset, Some(Failure::Truncated)) {
                    tracing::warn!(path = %path.display(), offset, "Session log truncated");
                    report(&self.errors_tx, e);
                }
            }
            Err(e) => {
                if self.advance(path, offset, Some(Failure::Unreadable)) {
                    tracing::warn!(path = %path.display(), error = %e, "Session log unreadable");
                    report(&self.errors_tx, e);
                } else {
                    tracing::trace!(path = %path.display(), "Session log still unreadable");
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Move the stored offset forward and record the file's failure state.
    ///
    /// Returns `true` when `failure` differs from the one already recorded,
    /// i.e. when it should be reported.
    fn advance(&self, path: &Path, offset: u64, failure: Option<Failure>) -> bool {
        let mut tails = lock(&self.tails);
        let Some(state) = tails.get_mut(path) else {
            return false;
        };
        state.offset = state.offset.max(offset);
        let newly_failing = failure.is_some() && failure != state.failing;
        state.failing = failure;
        newly_failing
    }
}
