//! Location discovery and the cache-or-scan decision.
//!
//! A group is served from its cache section while that section is at least
//! as new as every source location. Otherwise its sources are parsed,
//! merged into a fresh registry and committed back to the cache.

use std::collections::HashMap;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fnv::FnvHasher;
use rayon::prelude::*;

use super::flags::PoolFlags;
use super::merge::{add_component, add_components_two_pass, MergePolicy};
use super::PoolState;
use crate::cache::{ComponentCache, RefineContext, SectionSpec};
use crate::cancel::CancellationToken;
use crate::component::{Component, ComponentScope, LaunchableKind, MergeKind, OriginKind};
use crate::config::DataPaths;
use crate::error::{PoolError, Result};
use crate::location::{FormatKind, FormatStyle, GroupId, LocationGroup};
use crate::parser::{MetadataParser, ParseContext};
use crate::registry::ComponentRegistry;

pub const OS_CATALOG_KEY: &str = "os-catalog";
pub const LOCAL_METAINFO_KEY: &str = "local-metainfo";

const CATALOG_DIR: &str = "swcatalog";
const LEGACY_CATALOG_DIR: &str = "app-info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Also read per-user data such as user Flatpak installations.
    pub include_user_data: bool,
    /// Rescan every group regardless of cache age.
    pub force_refresh: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            include_user_data: true,
            force_refresh: false,
        }
    }
}

/// Result of a successful load.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub groups_refreshed: usize,
    pub groups_from_cache: usize,
    /// Per-file and per-component problems that did not stop the load.
    pub issues: Vec<PoolError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupOutcome {
    NoSources,
    FromCache,
    Refreshed { components: usize },
}

#[derive(Debug)]
pub(crate) struct GroupReport {
    pub outcome: GroupOutcome,
    pub issues: Vec<PoolError>,
}

/// Everything a group scan needs from the pool, detached from its lock
/// guard.
pub(crate) struct ScanSettings {
    pub flags: PoolFlags,
    pub locale: String,
    pub parser: Arc<dyn MetadataParser>,
    pub policy: MergePolicy,
    pub screenshot_service_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Location discovery
// ---------------------------------------------------------------------------

/// Builds the standard location groups from scratch.
///
/// The `os-catalog` and `local-metainfo` groups always exist, even when the
/// flags leave them without locations.
pub fn detect_std_metadata_dirs(
    paths: &DataPaths,
    flags: PoolFlags,
    include_user_data: bool,
) -> HashMap<String, LocationGroup> {
    let mut groups = HashMap::new();

    let mut os_catalog = LocationGroup::new(ComponentScope::System, FormatStyle::Catalog, true, OS_CATALOG_KEY);
    if flags.contains(PoolFlags::LOAD_OS_CATALOG) {
        for prefix in &paths.catalog_prefixes {
            let current = prefix.join(CATALOG_DIR);
            let legacy = prefix.join(LEGACY_CATALOG_DIR);
            if current.is_dir() {
                os_catalog.add_catalog_dir(&current, false);
            }
            if legacy.is_dir() && !is_link_to(&legacy, &current) {
                os_catalog.add_catalog_dir(&legacy, false);
            }
        }
    }

    let mut os_metainfo =
        LocationGroup::new(ComponentScope::System, FormatStyle::Metainfo, true, LOCAL_METAINFO_KEY);
    if flags.contains(PoolFlags::LOAD_OS_METAINFO) {
        os_metainfo.add_location(FormatKind::Xml, &paths.metainfo_dir, false);
    }
    // desktop entries are read for metainfo merging even when they are not
    // added on their own
    if flags.intersects(PoolFlags::LOAD_OS_METAINFO | PoolFlags::LOAD_OS_DESKTOP_FILES) {
        os_metainfo.add_location(FormatKind::DesktopEntry, &paths.applications_dir, false);
    }

    groups.insert(OS_CATALOG_KEY.to_string(), os_catalog);
    groups.insert(LOCAL_METAINFO_KEY.to_string(), os_metainfo);

    if flags.contains(PoolFlags::LOAD_FLATPAK) {
        let mut roots = vec![(ComponentScope::System, paths.flatpak_system_dir.clone())];
        if include_user_data {
            roots.extend(
                paths
                    .flatpak_user_dir
                    .clone()
                    .map(|dir| (ComponentScope::User, dir)),
            );
        }
        for (scope, root) in roots {
            for group in flatpak_groups(&root, scope) {
                groups.insert(group.cache_key.clone(), group);
            }
        }
    }

    groups
}

/// One group per `<root>/<repo>/<arch>/active` directory.
fn flatpak_groups(root: &Path, scope: ComponentScope) -> Vec<LocationGroup> {
    let mut groups = Vec::new();
    for repo in sorted_subdirs(root) {
        for arch in sorted_subdirs(&repo) {
            let active = arch.join("active");
            if !active.is_dir() {
                continue;
            }
            let key = format!("flatpak-{}-{}-{}", scope.as_str(), file_name(&repo), file_name(&arch));
            let mut group = LocationGroup::new(scope, FormatStyle::Catalog, false, key);
            group.add_location(FormatKind::Xml, &active, true);
            let icons = active.join("icons");
            if icons.is_dir() {
                group.add_icon_dir(icons);
            }
            groups.push(group);
        }
    }
    groups
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True when `path` is a symlink resolving to the same place as `target`.
fn is_link_to(path: &Path, target: &Path) -> bool {
    let is_link = fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return false;
    }
    match (fs::canonicalize(path), fs::canonicalize(target)) {
        (Ok(resolved), Ok(target)) => resolved == target,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Extra locations
// ---------------------------------------------------------------------------

/// Stable cache key for a user-supplied directory.
pub fn extra_cache_key(dir: &Path) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(dir.to_string_lossy().as_bytes());
    format!("extra-{:016x}", hasher.finish())
}

pub(crate) fn extra_group(dir: &Path, style: FormatStyle, home_dir: Option<&Path>) -> LocationGroup {
    let scope = match home_dir {
        Some(home) if dir.starts_with(home) => ComponentScope::User,
        _ => ComponentScope::System,
    };
    let mut group = LocationGroup::new(scope, style, false, extra_cache_key(dir));
    match style {
        FormatStyle::Catalog => group.add_catalog_dir(dir, true),
        FormatStyle::Metainfo => {
            group.add_location(FormatKind::Xml, dir, false);
            group.add_location(FormatKind::DesktopEntry, dir, false);
        }
    }
    group
}

// ---------------------------------------------------------------------------
// Group processing
// ---------------------------------------------------------------------------

pub(crate) fn process_group(
    group: &LocationGroup,
    cache: &mut dyn ComponentCache,
    settings: &ScanSettings,
    force_refresh: bool,
    cancel: &CancellationToken,
) -> Result<GroupReport> {
    if !group.has_locations() {
        return Ok(GroupReport {
            outcome: GroupOutcome::NoSources,
            issues: Vec::new(),
        });
    }

    let refine_ctx = RefineContext {
        locale: settings.locale.clone(),
        icon_dirs: group.icon_dirs.clone(),
        screenshot_service_url: settings.screenshot_service_url.clone(),
    };
    let section = SectionSpec {
        scope: group.scope,
        format_style: group.format_style,
        is_os_data: group.is_os_data,
        cache_key: group.cache_key.clone(),
    };

    if !force_refresh && !settings.flags.contains(PoolFlags::IGNORE_CACHE_AGE) {
        if let Some(cache_time) = cache.ctime(group.scope, &group.cache_key) {
            let sources_newer = group
                .newest_source_mtime()
                .is_some_and(|source_time| source_time > cache_time);
            if !sources_newer {
                match cache.load_section_for_key(&section, &refine_ctx) {
                    Ok(loaded) if !loaded.is_outdated => {
                        log::debug!(
                            "using cached data for group {} ({} components)",
                            group.cache_key,
                            loaded.components.len()
                        );
                        return Ok(GroupReport {
                            outcome: GroupOutcome::FromCache,
                            issues: Vec::new(),
                        });
                    }
                    Ok(_) => log::debug!("cache section for {} is outdated", group.cache_key),
                    Err(error) => log::warn!("failed to load cache section for {}: {error}", group.cache_key),
                }
            }
        }
    }

    let started = Instant::now();
    let mut registry = ComponentRegistry::new();
    let mut issues = Vec::new();
    match group.format_style {
        FormatStyle::Metainfo => scan_metainfo(group, settings, &mut registry, &mut issues, cancel)?,
        FormatStyle::Catalog => scan_catalog(group, settings, &mut registry, &mut issues, cancel)?,
    }

    let components = registry.len();
    cache.set_contents_for_section(&section, registry.into_contents(), &refine_ctx)?;
    log::info!(
        "refreshed group={} components={} issues={} elapsed_ms={}",
        group.cache_key,
        components,
        issues.len(),
        started.elapsed().as_millis()
    );

    Ok(GroupReport {
        outcome: GroupOutcome::Refreshed { components },
        issues,
    })
}

fn parse_context(group: &LocationGroup, settings: &ScanSettings) -> ParseContext {
    ParseContext {
        locale: settings.locale.clone(),
        format_style: group.format_style,
        scope: group.scope,
    }
}

fn scan_catalog(
    group: &LocationGroup,
    settings: &ScanSettings,
    registry: &mut ComponentRegistry,
    issues: &mut Vec<PoolError>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ctx = parse_context(group, settings);
    let files: Vec<(PathBuf, FormatKind)> = [FormatKind::Xml, FormatKind::Yaml]
        .into_iter()
        .flat_map(|kind| {
            group
                .source_files(kind)
                .into_iter()
                .map(move |path| (path, kind))
        })
        .collect();

    let parsed: Vec<(PathBuf, Result<Vec<Component>>)> = files
        .par_iter()
        .map(|(path, kind)| {
            let result = match cancel.is_cancelled() {
                Some(()) => settings.parser.parse_catalog(path, *kind, &ctx),
                None => Err(PoolError::Cancelled),
            };
            (path.clone(), result)
        })
        .collect();
    cancel.is_cancelled().ok_or(PoolError::Cancelled)?;

    let mut components = Vec::new();
    for (path, result) in parsed {
        match result {
            Ok(parsed) => {
                log::debug!("read {} components from {}", parsed.len(), path.display());
                components.extend(parsed.into_iter().map(|mut cpt| {
                    if cpt.origin_kind == OriginKind::Unknown {
                        cpt.origin_kind = OriginKind::Catalog;
                    }
                    cpt.scope = group.scope;
                    cpt
                }));
            }
            Err(error) => {
                log::debug!("skipping catalog file {}: {error}", path.display());
                issues.push(error);
            }
        }
    }

    issues.extend(add_components_two_pass(registry, components, &settings.policy));
    Ok(())
}

fn scan_metainfo(
    group: &LocationGroup,
    settings: &ScanSettings,
    registry: &mut ComponentRegistry,
    issues: &mut Vec<PoolError>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ctx = parse_context(group, settings);

    let mut desktop_entries: HashMap<String, Component> = HashMap::new();
    for (index, path) in group.source_files(FormatKind::DesktopEntry).into_iter().enumerate() {
        cancel.is_cancelled_sparse(index).ok_or(PoolError::Cancelled)?;
        match settings.parser.parse_metainfo(&path, FormatKind::DesktopEntry, &ctx) {
            Ok(Some(mut cpt)) => {
                cpt.scope = group.scope;
                desktop_entries.insert(file_name(&path), cpt);
            }
            Ok(None) => {}
            Err(error) => {
                log::debug!("error reading desktop entry {}: {error}", path.display());
                issues.push(error);
            }
        }
    }

    let mut merges = Vec::new();
    let mut add = |registry: &mut ComponentRegistry, cpt: Component, issues: &mut Vec<PoolError>| {
        if cpt.is_merge_component() {
            merges.push(cpt);
        } else if let Err(error) = add_component(registry, cpt, &settings.policy) {
            log::debug!("component ignored: {error}");
            issues.push(error);
        }
    };

    if settings.flags.contains(PoolFlags::LOAD_OS_METAINFO) {
        let skip_known = !settings.flags.contains(PoolFlags::PREFER_OS_METAINFO);
        for (index, path) in group.source_files(FormatKind::Xml).into_iter().enumerate() {
            cancel.is_cancelled_sparse(index).ok_or(PoolError::Cancelled)?;
            if skip_known && is_known_metainfo(registry, &path) {
                log::debug!("skipped {} (already known)", path.display());
                continue;
            }

            let mut cpt = match settings.parser.parse_metainfo(&path, FormatKind::Xml, &ctx) {
                Ok(Some(cpt)) => cpt,
                Ok(None) => continue,
                Err(error) => {
                    log::debug!("errors in {}: {error}", path.display());
                    issues.push(error);
                    continue;
                }
            };
            cpt.scope = group.scope;
            if cpt.origin_kind == OriginKind::Unknown {
                cpt.origin_kind = OriginKind::Metainfo;
            }

            let desktop_id = cpt
                .launchable_for_kind(LaunchableKind::DesktopId)
                .and_then(|launchable| launchable.entries.first().cloned())
                .unwrap_or_else(|| guess_desktop_id(&cpt.id));
            if let Some(desktop) = desktop_entries.remove(&desktop_id) {
                cpt.merge_with_mode(&desktop, MergeKind::Append);
            }
            add(registry, cpt, issues);
        }
    }

    if settings.flags.contains(PoolFlags::LOAD_OS_DESKTOP_FILES) {
        let mut remaining: Vec<(String, Component)> = desktop_entries.into_iter().collect();
        remaining.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, cpt) in remaining {
            add(registry, cpt, issues);
        }
    }

    for cpt in merges {
        if let Err(error) = add_component(registry, cpt, &settings.policy) {
            issues.push(error);
        }
    }
    Ok(())
}

fn guess_desktop_id(component_id: &str) -> String {
    if component_id.ends_with(".desktop") {
        component_id.to_string()
    } else {
        format!("{component_id}.desktop")
    }
}

/// Checks the id a metainfo file name implies against the registry.
fn is_known_metainfo(registry: &ComponentRegistry, path: &Path) -> bool {
    let name = file_name(path);
    let stem = name
        .strip_suffix(".metainfo.xml")
        .or_else(|| name.strip_suffix(".appdata.xml"))
        .or_else(|| name.strip_suffix(".xml"))
        .unwrap_or(&name);
    registry.has_id(stem) || registry.has_id(&format!("{stem}.desktop"))
}

// ---------------------------------------------------------------------------
// Pool-level loading
// ---------------------------------------------------------------------------

impl PoolState {
    pub(crate) fn scan_settings(&self, pedantic: bool) -> ScanSettings {
        ScanSettings {
            flags: self.flags,
            locale: self.locale.clone(),
            parser: Arc::clone(&self.context.parser),
            policy: MergePolicy {
                pedantic,
                prefer_local_metainfo: self.context.distro.prefer_local_metainfo,
                current_arch: self.context.arch.clone(),
            },
            screenshot_service_url: self.context.distro.screenshot_service_url.clone(),
        }
    }

    /// Runs the cache-or-scan decision for one group. Extra groups are
    /// scanned pedantically.
    pub(crate) fn process_group_by_id(
        &mut self,
        id: &GroupId,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<GroupReport> {
        let settings = self.scan_settings(matches!(id, GroupId::Extra(_)));
        let group = match id {
            GroupId::Standard(key) => self.std_groups.get(key),
            GroupId::Extra(key) => self.extra_groups.get(key),
        };
        let Some(group) = group else {
            return Err(PoolError::InvalidInput(format!("unknown location group {id:?}")));
        };
        process_group(group, self.cache.as_mut(), &settings, force_refresh, cancel)
    }

    pub(crate) fn detect_std_groups(&mut self, include_user_data: bool) {
        self.std_groups = if self.load_std_data_locations {
            detect_std_metadata_dirs(&self.context.config.data_paths, self.flags, include_user_data)
        } else {
            HashMap::new()
        };
    }

    /// Full load: clear, re-detect, then process every group.
    ///
    /// Stops at the first hard failure; sections committed before it stay
    /// visible.
    pub(crate) fn load(&mut self, options: LoadOptions, cancel: &CancellationToken) -> Result<LoadSummary> {
        cancel.is_cancelled().ok_or(PoolError::Cancelled)?;
        let started = Instant::now();
        self.cache.clear();
        self.apply_cache_settings();
        self.detect_std_groups(options.include_user_data);
        self.sync_monitors();

        let mut ids: Vec<GroupId> = self.std_groups.keys().cloned().map(GroupId::Standard).collect();
        ids.extend(self.extra_groups.keys().cloned().map(GroupId::Extra));

        let mut summary = LoadSummary::default();
        for id in ids {
            cancel.is_cancelled().ok_or(PoolError::Cancelled)?;
            let report = self.process_group_by_id(&id, options.force_refresh, cancel)?;
            match report.outcome {
                GroupOutcome::Refreshed { .. } => summary.groups_refreshed += 1,
                GroupOutcome::FromCache => summary.groups_from_cache += 1,
                GroupOutcome::NoSources => {}
            }
            summary.issues.extend(report.issues);
        }

        self.cache.prune_data();
        log::info!(
            "pool loaded: components={} refreshed={} cached={} issues={} elapsed_ms={}",
            self.cache.count(),
            summary.groups_refreshed,
            summary.groups_from_cache,
            summary.issues.len(),
            started.elapsed().as_millis()
        );
        Ok(summary)
    }
}
