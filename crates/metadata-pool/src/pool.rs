//! The metadata pool.
//!
//! ## Module Structure
//!
//! - `flags` - Source selection and behaviour flags
//! - `loader` - Location discovery and cache-or-scan loading
//! - `merge` - Per-component merge decisions
//! - `query` - Read-only lookups over the cache
//! - `refine` - Cache refine hook (icon paths, screenshot service)
//! - `reload` - Debounced automatic reloads
//!
//! [`Pool`] is a cheap handle over shared state. Queries take the read lock;
//! loading, flag changes and reloads take the write lock and hold it for
//! the whole scan-and-commit sequence.

mod flags;
mod loader;
mod merge;
mod query;
mod refine;
mod reload;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

use crate::cache::{ComponentCache, RefineFn, SectionCache};
use crate::cancel::CancellationToken;
use crate::component::{Component, ComponentScope};
use crate::config::PoolContext;
use crate::error::{PoolError, Result};
use crate::events::Subscribers;
use crate::location::{FormatStyle, GroupId, LocationGroup};
use crate::registry::ComponentRegistry;

pub use flags::PoolFlags;
pub use loader::{
    detect_std_metadata_dirs, extra_cache_key, LoadOptions, LoadSummary, LOCAL_METAINFO_KEY,
    OS_CATALOG_KEY,
};
pub use merge::{add_component, add_components_two_pass, AddOutcome, MergePolicy};
pub use refine::refine_component;

use reload::ReloadScheduler;

/// Notification sent to pool subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// The pool contents were reloaded, fully or for one group.
    Changed,
}

pub(crate) struct PoolState {
    pub context: PoolContext,
    pub locale: String,
    pub flags: PoolFlags,
    pub load_std_data_locations: bool,
    pub std_groups: HashMap<String, LocationGroup>,
    pub extra_groups: HashMap<String, LocationGroup>,
    pub cache: Box<dyn ComponentCache>,
    pub reload_tx: Sender<GroupId>,
}

pub(crate) struct PoolShared {
    pub state: RwLock<PoolState>,
    pub changed: Subscribers<PoolEvent>,
    /// Stops the reload worker when dropped.
    _scheduler: ReloadScheduler,
}

#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Creates a pool backed by a [`SectionCache`] in the configured cache
    /// directories.
    pub fn new(context: PoolContext) -> Self {
        let cache = SectionCache::new(context.locale.clone());
        Self::with_cache(context, Box::new(cache))
    }

    pub fn with_cache(context: PoolContext, mut cache: Box<dyn ComponentCache>) -> Self {
        cache.set_locations(
            context.config.cache.system_dir.clone(),
            context.config.cache.user_dir.clone(),
        );
        let refine: RefineFn = Arc::new(refine_component);
        cache.set_refine_func(Some(refine));

        let debounce = context.config.reload_debounce();
        let shared = Arc::new_cyclic(|weak| {
            let scheduler = ReloadScheduler::spawn(weak.clone(), debounce);
            let mut state = PoolState {
                locale: context.locale.clone(),
                context,
                flags: PoolFlags::default(),
                load_std_data_locations: true,
                std_groups: HashMap::new(),
                extra_groups: HashMap::new(),
                cache,
                reload_tx: scheduler.sender(),
            };
            state.apply_cache_settings();
            PoolShared {
                state: RwLock::new(state),
                changed: Subscribers::new(),
                _scheduler: scheduler,
            }
        });
        Self { shared }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Loads every enabled source, preferring up-to-date cache sections.
    pub fn load(&self) -> Result<LoadSummary> {
        self.load_with(LoadOptions::default(), &CancellationToken::noop())
    }

    /// Subscribers are notified after the load finishes, also when it
    /// failed part-way.
    pub fn load_with(&self, options: LoadOptions, cancel: &CancellationToken) -> Result<LoadSummary> {
        let result = self.shared.state.write().load(options, cancel);
        if let Err(error) = &result {
            log::warn!("pool load failed: {error}");
        }
        self.shared.changed.emit(PoolEvent::Changed);
        result
    }

    /// Runs [`Pool::load_with`] on a worker thread.
    pub fn load_async(&self, options: LoadOptions, cancel: CancellationToken) -> LoadTask {
        let (tx, rx) = bounded(1);
        let pool = self.clone();
        let worker_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("metadata-pool-load".to_string())
            .spawn(move || {
                let _ = worker_tx.send(pool.load_with(options, &cancel));
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(error) => {
                let _ = tx.send(Err(PoolError::Internal(format!(
                    "failed to spawn load thread: {error}"
                ))));
                None
            }
        };
        LoadTask { rx, handle }
    }

    /// Drops every loaded and overlay component. Location groups stay.
    pub fn clear(&self) {
        self.shared.state.write().cache.clear();
    }

    /// Adds components as an overlay on top of the cached data. They are
    /// never persisted and disappear on the next load.
    pub fn add_components(&self, components: Vec<Component>) -> Result<()> {
        let mut state = self.shared.state.write();
        let policy = state.scan_settings(false).policy;
        let mut registry = ComponentRegistry::new();
        for error in add_components_two_pass(&mut registry, components, &policy) {
            log::debug!("component not added: {error}");
        }
        state.cache.add_masking_components(registry.into_contents())
    }

    pub fn add_component(&self, component: Component) -> Result<()> {
        if component.is_ignored() {
            return Err(PoolError::Ignored(component.data_id()));
        }
        if !component.is_merge_component() && !component.is_valid() {
            return Err(PoolError::InvalidInput(format!(
                "component {} is missing required data",
                component.data_id()
            )));
        }
        self.add_components(vec![component])
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn flags(&self) -> PoolFlags {
        self.shared.state.read().flags
    }

    /// Replaces the flags. Monitors are installed or removed right away;
    /// source selection takes effect on the next load.
    pub fn set_flags(&self, flags: PoolFlags) {
        let mut state = self.shared.state.write();
        state.flags = flags;
        state.apply_cache_settings();
        state.sync_monitors();
    }

    pub fn add_flags(&self, flags: PoolFlags) {
        self.set_flags(self.flags() | flags);
    }

    pub fn remove_flags(&self, flags: PoolFlags) {
        self.set_flags(self.flags() - flags);
    }

    /// Whether the standard system locations are read at all.
    pub fn set_load_std_data_locations(&self, enabled: bool) {
        self.shared.state.write().load_std_data_locations = enabled;
    }

    /// Adds a directory holding catalog or metainfo data. It gets its own
    /// cache section and is scanned pedantically.
    pub fn add_extra_data_location(&self, dir: &Path, style: FormatStyle) {
        let mut state = self.shared.state.write();
        let group = loader::extra_group(dir, style, state.context.home_dir.as_deref());
        log::debug!("added extra data location {} as {}", dir.display(), group.cache_key);
        state.extra_groups.insert(group.cache_key.clone(), group);
        state.sync_monitors();
    }

    /// Removes every extra location together with its loaded data.
    pub fn reset_extra_data_locations(&self) {
        let mut state = self.shared.state.write();
        let groups: Vec<LocationGroup> = state.extra_groups.drain().map(|(_, group)| group).collect();
        for group in groups {
            state.cache.remove_section(group.scope, &group.cache_key);
        }
    }

    pub fn locale(&self) -> String {
        self.shared.state.read().locale.clone()
    }

    /// Changes the locale. Loaded data is dropped; call [`Pool::load`] to
    /// read it again in the new locale.
    pub fn set_locale(&self, locale: &str) {
        let mut state = self.shared.state.write();
        state.locale = locale.to_string();
        state.cache.set_locale(locale);
    }

    pub fn override_cache_locations(&self, system_dir: Option<PathBuf>, user_dir: Option<PathBuf>) {
        self.shared
            .state
            .write()
            .cache
            .set_locations(system_dir, user_dir);
    }

    /// Time the OS catalog section was last written, if it exists.
    pub fn os_metadata_cache_age(&self) -> Option<SystemTime> {
        self.shared
            .state
            .read()
            .cache
            .ctime(ComponentScope::System, OS_CATALOG_KEY)
    }

    /// Every directory the standard groups read from, as of the last load.
    pub fn std_data_locations(&self) -> Vec<PathBuf> {
        let state = self.shared.state.read();
        let mut locations: Vec<PathBuf> = state
            .std_groups
            .values()
            .flat_map(|group| group.locations.iter().map(|entry| entry.location.clone()))
            .collect();
        locations.sort();
        locations.dedup();
        locations
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> Receiver<PoolEvent> {
        self.shared.changed.subscribe()
    }

    /// Registers a callback run on the thread that finished the reload. The
    /// pool lock is not held while it runs.
    pub fn connect_changed<F>(&self, callback: F)
    where
        F: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        self.shared.changed.connect(callback);
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Pool")
            .field("locale", &state.locale)
            .field("flags", &state.flags)
            .field("std_groups", &state.std_groups.len())
            .field("extra_groups", &state.extra_groups.len())
            .field("components", &state.cache.count())
            .finish()
    }
}

impl PoolState {
    /// Pushes locale and flag-derived settings into the cache.
    pub(crate) fn apply_cache_settings(&mut self) {
        self.cache.set_locale(&self.locale);
        self.cache
            .set_prefer_os_metainfo(self.flags.contains(PoolFlags::PREFER_OS_METAINFO));
        self.cache
            .set_resolve_addons(self.flags.contains(PoolFlags::RESOLVE_ADDONS));
    }

    /// Installs or removes group monitors to match the `MONITOR` flag.
    pub(crate) fn sync_monitors(&mut self) {
        let enabled = self.flags.contains(PoolFlags::MONITOR);
        let standard = self
            .std_groups
            .iter_mut()
            .map(|(key, group)| (GroupId::Standard(key.clone()), group));
        let extra = self
            .extra_groups
            .iter_mut()
            .map(|(key, group)| (GroupId::Extra(key.clone()), group));

        for (id, group) in standard.chain(extra) {
            if !enabled {
                group.disable_monitor();
                continue;
            }
            if group.is_monitored() || !group.has_locations() {
                continue;
            }
            if let Err(error) = group.enable_monitor(id, self.reload_tx.clone()) {
                log::warn!("failed to monitor group {}: {error}", group.cache_key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Asynchronous load
// ---------------------------------------------------------------------------

/// Handle to a load running on a worker thread.
pub struct LoadTask {
    rx: Receiver<Result<LoadSummary>>,
    handle: Option<JoinHandle<()>>,
}

impl LoadTask {
    /// Blocks until the load finishes.
    pub fn wait(mut self) -> Result<LoadSummary> {
        let result = self.rx.recv().unwrap_or_else(|_| {
            Err(PoolError::Internal("load thread exited without a result".to_string()))
        });
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }

    /// Returns the result if the load has finished. The result is handed
    /// out only once.
    pub fn try_result(&self) -> Option<Result<LoadSummary>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::component::ComponentKind;
    use crate::config::{DataPaths, PoolConfig};

    fn context(root: &Path) -> PoolContext {
        let mut config = PoolConfig::default();
        config.data_paths = DataPaths::rooted_at(root);
        config.cache.system_dir = None;
        config.cache.user_dir = Some(root.join("cache"));
        config.reload_debounce_ms = 50;
        config.os_release_path = root.join("os-release");
        config.appstream_conf_path = root.join("appstream.conf");
        PoolContext::from_environment(config)
    }

    fn app(id: &str) -> Component {
        let mut cpt = Component::new(id, ComponentKind::DesktopApp);
        cpt.name = Some(id.to_string());
        cpt.summary = Some("test".to_string());
        cpt
    }

    #[test]
    fn flags_propagate_to_state() {
        let root = tempfile::tempdir().expect("tempdir");
        let pool = Pool::new(context(root.path()));
        assert_eq!(pool.flags(), PoolFlags::default());

        pool.add_flags(PoolFlags::PREFER_OS_METAINFO | PoolFlags::IGNORE_CACHE_AGE);
        pool.remove_flags(PoolFlags::LOAD_FLATPAK);
        let flags = pool.flags();
        assert!(flags.contains(PoolFlags::PREFER_OS_METAINFO));
        assert!(!flags.contains(PoolFlags::LOAD_FLATPAK));
    }

    #[test]
    fn overlay_components_are_queryable() {
        let root = tempfile::tempdir().expect("tempdir");
        let pool = Pool::new(context(root.path()));
        pool.add_components(vec![app("org.example.A"), app("org.example.B")])
            .expect("add");
        assert_eq!(pool.components().len(), 2);

        let mut hidden = app("org.example.C");
        hidden.ignored = true;
        assert!(matches!(pool.add_component(hidden), Err(PoolError::Ignored(_))));

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn reload_requests_are_coalesced() {
        let root = tempfile::tempdir().expect("tempdir");
        let pool = Pool::new(context(root.path()));
        pool.set_load_std_data_locations(false);
        let extra = root.path().join("extra");
        std::fs::create_dir_all(&extra).expect("mkdir");
        pool.add_extra_data_location(&extra, FormatStyle::Metainfo);
        pool.load().expect("load");

        let events = pool.subscribe();
        let (reload_tx, key) = {
            let state = pool.shared.state.read();
            let key = state.extra_groups.keys().next().cloned().expect("extra group");
            (state.reload_tx.clone(), key)
        };
        for _ in 0..5 {
            reload_tx.send(GroupId::Extra(key.clone())).expect("send");
        }

        assert_eq!(
            events.recv_timeout(Duration::from_secs(5)),
            Ok(PoolEvent::Changed)
        );
        assert!(events.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn resetting_extra_locations_drops_their_data() {
        let root = tempfile::tempdir().expect("tempdir");
        let pool = Pool::new(context(root.path()));
        pool.set_load_std_data_locations(false);
        let extra = root.path().join("extra");
        std::fs::create_dir_all(&extra).expect("mkdir");
        std::fs::write(
            extra.join("org.example.A.desktop"),
            "[Desktop Entry]\nType=Application\nName=A\nComment=a\n",
        )
        .expect("write");
        pool.add_extra_data_location(&extra, FormatStyle::Metainfo);
        pool.load().expect("load");
        assert_eq!(pool.components_by_id("org.example.A").len(), 1);

        pool.reset_extra_data_locations();
        assert!(pool.is_empty());
    }

    #[test]
    fn load_task_delivers_result() {
        let root = tempfile::tempdir().expect("tempdir");
        let pool = Pool::new(context(root.path()));
        pool.set_load_std_data_locations(false);
        let task = pool.load_async(LoadOptions::default(), CancellationToken::noop());
        let summary = task.wait().expect("load");
        assert_eq!(summary.groups_refreshed, 0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pool.load_async(LoadOptions::default(), cancel).wait();
        assert!(matches!(result, Err(PoolError::Cancelled)));
    }
}
