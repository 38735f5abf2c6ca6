//! Event coalescing for the file monitor.
//!
//! The queue is driven by raw watcher events and a caller-supplied clock,
//! so the debounce rules can be exercised without a live watcher.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Settle time after create/change events, which never carry a done hint.
pub const SETTLE_TIMEOUT: Duration = Duration::from_millis(800);

/// Settle time after an explicit changes-done hint.
pub const DONE_HINT_TIMEOUT: Duration = Duration::from_millis(50);

/// Low-level change notifications, as delivered by the platform watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Changed(PathBuf),
    AttributeChanged(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    MovedIn(PathBuf),
    MovedOut(PathBuf),
    ChangesDoneHint(PathBuf),
}

impl RawEvent {
    fn primary_path(&self) -> &Path {
        match self {
            RawEvent::Created(path)
            | RawEvent::Deleted(path)
            | RawEvent::Changed(path)
            | RawEvent::AttributeChanged(path)
            | RawEvent::MovedIn(path)
            | RawEvent::MovedOut(path)
            | RawEvent::ChangesDoneHint(path) => path,
            RawEvent::Renamed { from, .. } => from,
        }
    }
}

/// Debounced notifications handed to monitor consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Added(PathBuf),
    Removed(PathBuf),
    Changed(PathBuf),
}

#[derive(Debug, Default)]
pub struct EventQueue {
    known: HashSet<PathBuf>,
    queue_add: Vec<PathBuf>,
    queue_changed: Vec<PathBuf>,
    queue_temp: Vec<PathBuf>,
    deadline: Option<Instant>,
    watched_dirs: Vec<PathBuf>,
    watched_files: HashSet<PathBuf>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watched directory and the files already inside it.
    pub fn watch_directory(&mut self, dir: PathBuf, existing: impl IntoIterator<Item = PathBuf>) {
        self.known.extend(existing);
        if !self.watched_dirs.contains(&dir) {
            self.watched_dirs.push(dir);
        }
    }

    /// Registers a single watched file; it is only known if it exists.
    pub fn watch_file(&mut self, path: PathBuf, exists: bool) {
        if exists {
            self.known.insert(path.clone());
        }
        self.watched_files.insert(path);
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known.contains(path)
    }

    pub fn known_files(&self) -> Vec<PathBuf> {
        self.known.iter().cloned().collect()
    }

    /// When the pending queues should be flushed, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Applies one raw event and returns the notifications that must be
    /// emitted right away. Queued work is released by [`Self::poll`].
    pub fn handle(&mut self, event: RawEvent, now: Instant) -> Vec<MonitorEvent> {
        let mut emitted = Vec::new();

        if !self.in_scope(&event) {
            return emitted;
        }
        if is_ignored_file(event.primary_path()) {
            log::debug!("monitor ignoring hidden or swap file {}", event.primary_path().display());
            return emitted;
        }

        match event {
            RawEvent::ChangesDoneHint(_) => self.arm(now, DONE_HINT_TIMEOUT),
            RawEvent::Created(path) | RawEvent::MovedIn(path) => {
                if path.exists() {
                    push_unique(&mut self.queue_add, path);
                } else {
                    push_unique(&mut self.queue_temp, path);
                }
                self.arm(now, SETTLE_TIMEOUT);
            }
            RawEvent::Deleted(path) | RawEvent::MovedOut(path) => {
                if self.known.contains(&path) {
                    self.emit_removed(path, &mut emitted);
                } else {
                    log::debug!("monitor ignoring removal of unknown file {}", path.display());
                }
            }
            RawEvent::Changed(path) | RawEvent::AttributeChanged(path) => {
                if !self.queue_add.contains(&path) && !self.queue_temp.contains(&path) {
                    push_unique(&mut self.queue_changed, path);
                }
                self.arm(now, SETTLE_TIMEOUT);
            }
            RawEvent::Renamed { from, to } => {
                // the new name is announced here, not again on flush
                self.queue_add.retain(|pending| pending != &to);
                if remove_item(&mut self.queue_temp, &from) {
                    log::debug!("monitor detected atomic save of {}", to.display());
                    if self.known.contains(&to) {
                        emitted.push(MonitorEvent::Changed(to));
                    } else {
                        self.emit_added(to, &mut emitted);
                    }
                } else {
                    self.queue_add.retain(|pending| pending != &from);
                    self.emit_removed(from, &mut emitted);
                    self.emit_added(to, &mut emitted);
                }
            }
        }

        emitted
    }

    /// Flushes when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Vec<MonitorEvent> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => Vec::new(),
        }
    }

    /// Emits all pending changes, then pending additions.
    pub fn flush(&mut self) -> Vec<MonitorEvent> {
        self.deadline = None;
        let mut emitted: Vec<MonitorEvent> = self
            .queue_changed
            .drain(..)
            .map(MonitorEvent::Changed)
            .collect();

        let pending: Vec<PathBuf> = self.queue_add.drain(..).collect();
        for path in pending {
            if self.known.contains(&path) {
                // atomic replace of an existing file
                emitted.push(MonitorEvent::Changed(path));
            } else {
                self.emit_added(path, &mut emitted);
            }
        }
        emitted
    }

    fn arm(&mut self, now: Instant, timeout: Duration) {
        self.deadline = Some(now + timeout);
    }

    fn emit_added(&mut self, path: PathBuf, emitted: &mut Vec<MonitorEvent>) {
        self.known.insert(path.clone());
        emitted.push(MonitorEvent::Added(path));
    }

    fn emit_removed(&mut self, path: PathBuf, emitted: &mut Vec<MonitorEvent>) {
        self.known.remove(&path);
        emitted.push(MonitorEvent::Removed(path));
    }

    fn in_scope(&self, event: &RawEvent) -> bool {
        let covered = |path: &Path| {
            self.watched_files.contains(path)
                || self.watched_dirs.iter().any(|dir| path.starts_with(dir))
        };
        match event {
            RawEvent::Renamed { from, to } => covered(from) || covered(to),
            other => covered(other.primary_path()),
        }
    }
}

/// Hidden files and editor swap files never produce notifications.
pub fn is_ignored_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.starts_with('.') || name.ends_with(".swp") || name.ends_with(".swx")
}

fn push_unique(queue: &mut Vec<PathBuf>, path: PathBuf) {
    if !queue.contains(&path) {
        queue.push(path);
    }
}

fn remove_item(queue: &mut Vec<PathBuf>, path: &Path) -> bool {
    match queue.iter().position(|entry| entry == path) {
        Some(index) => {
            queue.swap_remove(index);
            true
        }
        None => false,
    }
}
