//! Debounced file monitoring.
//!
//! - `queue`: pure coalescing rules (temp files, atomic saves, settle timers)
//! - `watch`: the `notify`-backed monitor and its worker thread

mod queue;
mod watch;

pub use queue::{
    is_ignored_file, EventQueue, MonitorEvent, RawEvent, DONE_HINT_TIMEOUT, SETTLE_TIMEOUT,
};
pub use watch::FileMonitor;
