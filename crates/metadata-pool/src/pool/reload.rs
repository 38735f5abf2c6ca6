//! Automatic group reloads driven by location monitors.
//!
//! Monitors send the id of the group that changed. Each group gets its own
//! debounce deadline; a repeated request restarts it. When a deadline
//! passes the worker refreshes that one group under the write lock and
//! announces the change.

use std::collections::HashMap;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, select, unbounded, Receiver, Sender};

use super::{PoolEvent, PoolShared};
use crate::cancel::CancellationToken;
use crate::location::GroupId;

/// Pending reload deadlines, one per group.
#[derive(Debug)]
pub(crate) struct DebounceTable {
    delay: Duration,
    deadlines: HashMap<GroupId, Instant>,
}

impl DebounceTable {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: HashMap::new(),
        }
    }

    /// Schedules a reload, restarting the deadline if one is pending.
    pub fn request(&mut self, id: GroupId, now: Instant) {
        self.deadlines.insert(id, now + self.delay);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every group whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<GroupId> {
        let due: Vec<GroupId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            self.deadlines.remove(id);
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

pub(crate) struct ReloadScheduler {
    requests: Sender<GroupId>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ReloadScheduler {
    pub fn spawn(pool: Weak<PoolShared>, delay: Duration) -> Self {
        let (requests, request_rx) = unbounded();
        let (shutdown, shutdown_rx) = unbounded();
        let worker = thread::Builder::new()
            .name("metadata-pool-reload".to_string())
            .spawn(move || run_scheduler(request_rx, shutdown_rx, pool, delay));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::warn!("automatic reloads disabled, failed to spawn scheduler: {error}");
                None
            }
        };

        Self {
            requests,
            shutdown: Some(shutdown),
            worker,
        }
    }

    /// Sender that monitors use to request a group reload.
    pub fn sender(&self) -> Sender<GroupId> {
        self.requests.clone()
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        // disconnecting the shutdown channel stops the worker
        self.shutdown.take();
        if let Some(handle) = self.worker.take() {
            // the worker may hold the last pool reference while reloading
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run_scheduler(
    requests: Receiver<GroupId>,
    shutdown: Receiver<()>,
    pool: Weak<PoolShared>,
    delay: Duration,
) {
    let mut pending = DebounceTable::new(delay);
    loop {
        let timer = match pending.next_deadline() {
            Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
            None => never(),
        };

        select! {
            recv(shutdown) -> _ => break,
            recv(requests) -> request => match request {
                Ok(id) => {
                    log::debug!("reload requested for {id:?}");
                    pending.request(id, Instant::now());
                }
                Err(_) => break,
            },
            recv(timer) -> _ => {}
        }

        for id in pending.take_due(Instant::now()) {
            let Some(shared) = pool.upgrade() else {
                return;
            };
            reload_group(&shared, &id);
        }
    }
    log::debug!("reload scheduler stopped");
}

fn reload_group(shared: &PoolShared, id: &GroupId) {
    let cancel = CancellationToken::noop();
    let result = shared.state.write().process_group_by_id(id, true, &cancel);
    match result {
        Ok(report) => log::info!(
            "reloaded group {} ({:?}, {} issues)",
            id.cache_key(),
            report.outcome,
            report.issues.len()
        ),
        Err(error) => log::warn!("failed to reload group {}: {error}", id.cache_key()),
    }
    shared.changed.emit(PoolEvent::Changed);
}
