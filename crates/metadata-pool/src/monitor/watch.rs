//! Live file monitor backed by `notify`.
//!
//! Watcher callbacks only forward raw events through a crossbeam channel.
//! A single worker thread owns the timing: it feeds the [`EventQueue`] and
//! sleeps until the queue deadline, then flushes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::queue::{is_ignored_file, EventQueue, MonitorEvent, RawEvent};
use crate::error::{PoolError, Result};
use crate::events::Subscribers;

enum WorkerMessage {
    Raw(RawEvent),
    Shutdown,
}

pub struct FileMonitor {
    watcher: RecommendedWatcher,
    queue: Arc<Mutex<EventQueue>>,
    subscribers: Arc<Subscribers<MonitorEvent>>,
    worker_tx: Sender<WorkerMessage>,
    worker: Option<JoinHandle<()>>,
}

impl FileMonitor {
    pub fn new() -> Result<Self> {
        let (worker_tx, worker_rx) = unbounded();
        let queue = Arc::new(Mutex::new(EventQueue::new()));
        let subscribers = Arc::new(Subscribers::new());

        let callback_tx = worker_tx.clone();
        let watcher = recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
            Ok(event) => {
                for raw in translate_event(event) {
                    let _ = callback_tx.send(WorkerMessage::Raw(raw));
                }
            }
            Err(error) => log::warn!("file monitor error: {error}"),
        })
        .map_err(|error| PoolError::Watch {
            path: PathBuf::new(),
            message: format!("failed to create watcher: {error}"),
        })?;

        let worker_queue = Arc::clone(&queue);
        let worker_subscribers = Arc::clone(&subscribers);
        let worker = thread::Builder::new()
            .name("metadata-pool-monitor".to_string())
            .spawn(move || run_worker(worker_rx, worker_queue, worker_subscribers))
            .map_err(|error| {
                PoolError::Internal(format!("failed to spawn file monitor thread: {error}"))
            })?;

        Ok(Self {
            watcher,
            queue,
            subscribers,
            worker_tx,
            worker: Some(worker),
        })
    }

    /// Watches a directory recursively.
    ///
    /// Files already present are recorded as known without emitting
    /// `Added` for them.
    pub fn add_directory(&mut self, path: &Path) -> Result<()> {
        let entries = fs::read_dir(path).map_err(|error| PoolError::Watch {
            path: path.to_path_buf(),
            message: format!("failed to enumerate directory: {error}"),
        })?;
        let existing: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|entry| !is_ignored_file(entry))
            .collect();

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|error| PoolError::Watch {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;

        log::debug!(
            "monitoring directory {} ({} known files)",
            path.display(),
            existing.len()
        );
        self.queue.lock().watch_directory(path.to_path_buf(), existing);
        Ok(())
    }

    /// Watches a single file through its parent directory, so atomic
    /// replacements of the file are still seen.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        self.watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|error| PoolError::Watch {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;

        self.queue
            .lock()
            .watch_file(path.to_path_buf(), path.exists());
        Ok(())
    }

    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        self.subscribers.subscribe()
    }

    /// Registers a callback run on the monitor thread for every event.
    pub fn connect<F>(&self, callback: F)
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.subscribers.connect(callback);
    }

    pub fn known_files(&self) -> Vec<PathBuf> {
        self.queue.lock().known_files()
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        let _ = self.worker_tx.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("file monitor thread panicked");
            }
        }
    }
}

fn run_worker(
    rx: Receiver<WorkerMessage>,
    queue: Arc<Mutex<EventQueue>>,
    subscribers: Arc<Subscribers<MonitorEvent>>,
) {
    loop {
        let deadline = queue.lock().deadline();
        let message = match deadline {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let emitted = match message {
            Ok(WorkerMessage::Raw(raw)) => queue.lock().handle(raw, Instant::now()),
            Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => queue.lock().poll(Instant::now()),
        };

        for event in emitted {
            log::debug!("monitor emit {event:?}");
            subscribers.emit(event);
        }
    }
}

/// Maps a `notify` event onto the raw event vocabulary of the queue.
fn translate_event(event: Event) -> Vec<RawEvent> {
    let mut paths = event.paths;
    match event.kind {
        EventKind::Create(_) => paths.into_iter().map(RawEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(RawEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let to = paths.pop();
            let from = paths.pop();
            match (from, to) {
                (Some(from), Some(to)) => vec![RawEvent::Renamed { from, to }],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(RawEvent::MovedOut).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(RawEvent::MovedIn).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    RawEvent::MovedIn(path)
                } else {
                    RawEvent::MovedOut(path)
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            paths.into_iter().map(RawEvent::AttributeChanged).collect()
        }
        EventKind::Modify(_) => paths.into_iter().map(RawEvent::Changed).collect(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.into_iter().map(RawEvent::ChangesDoneHint).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, MetadataKind};

    #[test]
    fn translates_rename_pairs() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tmp/a"))
            .add_path(PathBuf::from("/tmp/b"));
        assert_eq!(
            translate_event(event),
            vec![RawEvent::Renamed {
                from: PathBuf::from("/tmp/a"),
                to: PathBuf::from("/tmp/b"),
            }]
        );
    }

    #[test]
    fn translates_basic_kinds() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/a"));
        assert_eq!(translate_event(created), vec![RawEvent::Created(PathBuf::from("/a"))]);

        let attrs = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)))
            .add_path(PathBuf::from("/a"));
        assert_eq!(
            translate_event(attrs),
            vec![RawEvent::AttributeChanged(PathBuf::from("/a"))]
        );

        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(PathBuf::from("/a"));
        assert_eq!(
            translate_event(closed),
            vec![RawEvent::ChangesDoneHint(PathBuf::from("/a"))]
        );

        let read = Event::new(EventKind::Access(AccessKind::Read)).add_path(PathBuf::from("/a"));
        assert!(translate_event(read).is_empty());
    }

    #[test]
    fn add_directory_records_existing_files_as_known() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("one.xml"), "x").expect("write");
        std::fs::write(dir.path().join(".hidden"), "x").expect("write");

        let mut monitor = FileMonitor::new().expect("monitor");
        monitor.add_directory(dir.path()).expect("watch");
        assert_eq!(monitor.known_files(), vec![dir.path().join("one.xml")]);
    }

    #[test]
    fn add_file_only_knows_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = FileMonitor::new().expect("monitor");
        monitor
            .add_file(&dir.path().join("missing.xml"))
            .expect("watch");
        assert!(monitor.known_files().is_empty());
    }

    #[test]
    fn missing_directory_is_a_watch_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = FileMonitor::new().expect("monitor");
        let error = monitor
            .add_directory(&dir.path().join("missing"))
            .expect_err("missing dir");
        assert!(matches!(error, PoolError::Watch { .. }));
    }
}
