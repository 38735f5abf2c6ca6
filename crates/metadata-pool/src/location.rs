//! Location groups: source directories that share one cache section.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::component::ComponentScope;
use crate::error::Result;
use crate::monitor::{FileMonitor, MonitorEvent};

/// Extensions that mark a compressed metadata file.
const COMPRESSED_EXTENSIONS: &[&str] = &["gz", "xz", "zst"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    Xml,
    Yaml,
    DesktopEntry,
}

/// Catalog data describes many components per file, metainfo one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatStyle {
    Catalog,
    Metainfo,
}

impl FormatStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatStyle::Catalog => "catalog",
            FormatStyle::Metainfo => "metainfo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    pub format_kind: FormatKind,
    pub location: PathBuf,
    /// Only read compressed files from this location.
    pub compressed_only: bool,
}

impl LocationEntry {
    pub fn new(format_kind: FormatKind, location: impl Into<PathBuf>, compressed_only: bool) -> Self {
        Self {
            format_kind,
            location: location.into(),
            compressed_only,
        }
    }

    /// Metadata files directly inside this location, sorted by path.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.location) else {
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| self.accepts(path))
            .collect();
        files.sort();
        files
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        if self.compressed_only && !is_compressed(path) {
            return false;
        }
        match self.format_kind {
            FormatKind::Xml => name.contains(".xml"),
            FormatKind::Yaml => name.contains(".yml") || name.contains(".yaml"),
            FormatKind::DesktopEntry => name.ends_with(".desktop"),
        }
    }

    /// Newest modification time of the location directory and its files.
    pub fn newest_mtime(&self) -> Option<SystemTime> {
        let dir_mtime = fs::metadata(&self.location)
            .and_then(|meta| meta.modified())
            .ok();
        self.source_files()
            .iter()
            .filter_map(|path| fs::metadata(path).and_then(|meta| meta.modified()).ok())
            .chain(dir_mtime)
            .max()
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| COMPRESSED_EXTENSIONS.contains(&ext))
}

/// Identifies a group within the pool; standard and extra groups live in
/// separate namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupId {
    Standard(String),
    Extra(String),
}

impl GroupId {
    pub fn cache_key(&self) -> &str {
        match self {
            GroupId::Standard(key) | GroupId::Extra(key) => key,
        }
    }
}

pub struct LocationGroup {
    pub scope: ComponentScope,
    pub format_style: FormatStyle,
    pub is_os_data: bool,
    pub locations: Vec<LocationEntry>,
    pub icon_dirs: Vec<PathBuf>,
    pub cache_key: String,
    monitor: Option<FileMonitor>,
}

impl LocationGroup {
    pub fn new(
        scope: ComponentScope,
        format_style: FormatStyle,
        is_os_data: bool,
        cache_key: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            format_style,
            is_os_data,
            locations: Vec::new(),
            icon_dirs: Vec::new(),
            cache_key: cache_key.into(),
            monitor: None,
        }
    }

    pub fn add_location(&mut self, format_kind: FormatKind, location: impl Into<PathBuf>, compressed_only: bool) {
        let entry = LocationEntry::new(format_kind, location, compressed_only);
        if !self.locations.contains(&entry) {
            self.locations.push(entry);
        }
    }

    pub fn add_icon_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.icon_dirs.contains(&dir) {
            self.icon_dirs.push(dir);
        }
    }

    /// Adds a catalog root laid out as `xml/`, `xmls/`, `yaml/` and `icons/`.
    ///
    /// With `add_root` the directory itself is also scanned when none of the
    /// format subdirectories exist.
    pub fn add_catalog_dir(&mut self, dir: &Path, add_root: bool) {
        let mut found = false;
        for (subdir, format_kind) in [
            ("xml", FormatKind::Xml),
            ("xmls", FormatKind::Xml),
            ("yaml", FormatKind::Yaml),
        ] {
            let path = dir.join(subdir);
            if path.is_dir() {
                self.add_location(format_kind, path, false);
                found = true;
            }
        }

        if !found && add_root && dir.is_dir() {
            self.add_location(FormatKind::Xml, dir, false);
            self.add_location(FormatKind::Yaml, dir, false);
        }

        let icons = dir.join("icons");
        if icons.is_dir() {
            self.add_icon_dir(icons);
        }
    }

    pub fn has_locations(&self) -> bool {
        !self.locations.is_empty()
    }

    pub fn locations_for(&self, format_kind: FormatKind) -> impl Iterator<Item = &LocationEntry> {
        self.locations
            .iter()
            .filter(move |entry| entry.format_kind == format_kind)
    }

    pub fn source_files(&self, format_kind: FormatKind) -> Vec<PathBuf> {
        self.locations_for(format_kind)
            .flat_map(LocationEntry::source_files)
            .collect()
    }

    /// Newest modification time across every location of the group.
    pub fn newest_source_mtime(&self) -> Option<SystemTime> {
        self.locations
            .iter()
            .filter_map(LocationEntry::newest_mtime)
            .max()
    }

    /// Installs a monitor on every existing location. Each debounced event
    /// sends `id` to `reload_tx`.
    ///
    /// Locations that cannot be watched are logged and skipped.
    pub fn enable_monitor(&mut self, id: GroupId, reload_tx: Sender<GroupId>) -> Result<()> {
        let mut monitor = FileMonitor::new()?;
        for entry in &self.locations {
            if !entry.location.is_dir() {
                continue;
            }
            if let Err(error) = monitor.add_directory(&entry.location) {
                log::warn!(
                    "not monitoring {} for group {}: {error}",
                    entry.location.display(),
                    self.cache_key
                );
            }
        }

        monitor.connect(move |event: &MonitorEvent| {
            log::debug!("metadata change for {:?}: {event:?}", id);
            let _ = reload_tx.send(id.clone());
        });
        self.monitor = Some(monitor);
        Ok(())
    }

    pub fn is_monitored(&self) -> bool {
        self.monitor.is_some()
    }

    /// Drops the monitor, cancelling its watches.
    pub fn disable_monitor(&mut self) {
        self.monitor = None;
    }
}

impl std::fmt::Debug for LocationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationGroup")
            .field("scope", &self.scope)
            .field("format_style", &self.format_style)
            .field("is_os_data", &self.is_os_data)
            .field("locations", &self.locations)
            .field("icon_dirs", &self.icon_dirs)
            .field("cache_key", &self.cache_key)
            .field("monitored", &self.monitor.is_some())
            .finish()
    }
}
