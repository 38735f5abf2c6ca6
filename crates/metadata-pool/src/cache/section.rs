//! File-backed component cache.
//!
//! Each section lives at `<dir>/<locale>/<scope>-<cache_key>.bin.zst`. The
//! system directory is only ever read; new data is written to the user
//! directory. Loaded sections stay in memory and every query runs over a
//! merged view of them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use super::persistence::{
    file_mtime, read_section, unix_now_secs, write_section, PersistentSection, SectionExpectation,
    SECTION_CACHE_VERSION, TMP_SUFFIX,
};
use super::{ComponentCache, RefineContext, RefineFn, RefineMode, SectionLoad, SectionSpec};
use crate::component::{
    BundleKind, Component, ComponentKind, ComponentScope, LaunchableKind, ProvidedKind,
};
use crate::error::{PoolError, Result};
use crate::location::FormatStyle;

const SECTION_SUFFIX: &str = ".bin.zst";

/// Unused section files older than this are removed by `prune_data`.
const PRUNE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SectionKey {
    Keyed { scope: ComponentScope, cache_key: String },
    Path(PathBuf),
}

struct LoadedSection {
    format_style: Option<FormatStyle>,
    is_os_data: bool,
    components: Vec<Component>,
}

pub struct SectionCache {
    locale: String,
    system_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
    prefer_os_metainfo: bool,
    resolve_addons: bool,
    refine: Option<RefineFn>,
    sections: HashMap<SectionKey, LoadedSection>,
    masking: HashMap<String, Component>,
    masked: HashSet<String>,
    /// Memoized result of `build_view`, dropped on every mutation.
    merged: Mutex<Option<Arc<Vec<Component>>>>,
}

impl SectionCache {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            system_dir: None,
            user_dir: None,
            prefer_os_metainfo: false,
            resolve_addons: true,
            refine: None,
            sections: HashMap::new(),
            masking: HashMap::new(),
            masked: HashSet::new(),
            merged: Mutex::new(None),
        }
    }

    fn invalidate(&mut self) {
        *self.merged.get_mut() = None;
    }

    fn section_file_name(scope: ComponentScope, cache_key: &str) -> String {
        let scope = match scope {
            ComponentScope::Unknown => "unknown",
            other => other.as_str(),
        };
        format!("{scope}-{cache_key}{SECTION_SUFFIX}")
    }

    fn section_path(&self, dir: &Path, scope: ComponentScope, cache_key: &str) -> PathBuf {
        dir.join(&self.locale)
            .join(Self::section_file_name(scope, cache_key))
    }

    /// Stored copies of a section, newest first.
    fn stored_copies(&self, scope: ComponentScope, cache_key: &str) -> Vec<(PathBuf, SystemTime)> {
        let mut copies: Vec<(PathBuf, SystemTime)> = [&self.user_dir, &self.system_dir]
            .into_iter()
            .flatten()
            .map(|dir| self.section_path(dir, scope, cache_key))
            .filter_map(|path| file_mtime(&path).map(|mtime| (path, mtime)))
            .collect();
        copies.sort_by(|a, b| b.1.cmp(&a.1));
        copies
    }

    fn refine_all(&self, components: &mut [Component], mode: RefineMode, ctx: &RefineContext) {
        if let Some(refine) = &self.refine {
            for cpt in components.iter_mut() {
                refine(cpt, mode, ctx);
            }
        }
    }

    /// Drops entries that cannot be stored: invalid records and merge
    /// components, which never stand alone.
    fn storable(components: Vec<Component>) -> Vec<Component> {
        components
            .into_iter()
            .filter(|cpt| {
                if cpt.is_merge_component() {
                    return false;
                }
                if !cpt.is_valid() {
                    log::debug!("not caching invalid component {}", cpt.data_id());
                    return false;
                }
                true
            })
            .collect()
    }

    fn store(
        &mut self,
        key: SectionKey,
        path: &Path,
        spec: Option<&SectionSpec>,
        components: Vec<Component>,
        ctx: &RefineContext,
    ) -> Result<()> {
        let mut components = Self::storable(components);
        self.refine_all(&mut components, RefineMode::Serialize, ctx);

        let (scope, cache_key) = match &key {
            SectionKey::Keyed { scope, cache_key } => (*scope, cache_key.clone()),
            SectionKey::Path(path) => (ComponentScope::Unknown, path.display().to_string()),
        };
        let persistent = PersistentSection {
            version: SECTION_CACHE_VERSION,
            locale: self.locale.clone(),
            cache_key,
            scope,
            format_style: spec.map(|spec| spec.format_style),
            is_os_data: spec.is_some_and(|spec| spec.is_os_data),
            saved_at: unix_now_secs(),
            components,
        };
        let written = write_section(path, &persistent);
        self.invalidate();

        // keep the in-memory copy even when the write failed, so the data
        // that was merged stays visible
        let mut components = persistent.components;
        self.refine_all(&mut components, RefineMode::Deserialize, ctx);
        self.sections.insert(
            key,
            LoadedSection {
                format_style: persistent.format_style,
                is_os_data: persistent.is_os_data,
                components,
            },
        );
        written
    }

    fn load(
        &mut self,
        key: SectionKey,
        candidates: Vec<PathBuf>,
        expected_key: &str,
        ctx: &RefineContext,
    ) -> SectionLoad {
        self.invalidate();
        let expect = SectionExpectation {
            locale: &self.locale,
            cache_key: expected_key,
        };
        let Some(section) = candidates
            .iter()
            .find_map(|path| read_section(path, &expect))
        else {
            self.sections.remove(&key);
            return SectionLoad {
                components: Vec::new(),
                is_outdated: true,
            };
        };

        let mut components = section.components;
        self.refine_all(&mut components, RefineMode::Deserialize, ctx);
        self.sections.insert(
            key,
            LoadedSection {
                format_style: section.format_style,
                is_os_data: section.is_os_data,
                components: components.clone(),
            },
        );
        SectionLoad {
            components,
            is_outdated: false,
        }
    }

    /// Merged query view, built once per change of the loaded data.
    fn view(&self) -> Arc<Vec<Component>> {
        let mut merged = self.merged.lock();
        if let Some(view) = merged.as_ref() {
            return Arc::clone(view);
        }
        let view = Arc::new(self.build_view());
        *merged = Some(Arc::clone(&view));
        view
    }

    /// Merged query view over every loaded section and the overlay.
    fn build_view(&self) -> Vec<Component> {
        let mut by_data_id: HashMap<String, Component> = HashMap::new();
        let mut os_catalog_ids: HashSet<&str> = HashSet::new();
        let mut os_metainfo_ids: HashSet<&str> = HashSet::new();

        for section in self.sections.values().filter(|section| section.is_os_data) {
            let ids = match section.format_style {
                Some(FormatStyle::Catalog) => &mut os_catalog_ids,
                Some(FormatStyle::Metainfo) => &mut os_metainfo_ids,
                None => continue,
            };
            ids.extend(section.components.iter().map(|cpt| cpt.id.as_str()));
        }

        for section in self.sections.values() {
            let shadowed_by: Option<&HashSet<&str>> = match (section.is_os_data, section.format_style) {
                (true, Some(FormatStyle::Metainfo)) if !self.prefer_os_metainfo => Some(&os_catalog_ids),
                (true, Some(FormatStyle::Catalog)) if self.prefer_os_metainfo => Some(&os_metainfo_ids),
                _ => None,
            };

            for cpt in &section.components {
                if shadowed_by.is_some_and(|ids| ids.contains(cpt.id.as_str())) {
                    continue;
                }
                let data_id = cpt.data_id();
                match by_data_id.get(&data_id) {
                    Some(existing) if existing.priority >= cpt.priority => {}
                    _ => {
                        by_data_id.insert(data_id, cpt.clone());
                    }
                }
            }
        }

        for (data_id, cpt) in &self.masking {
            by_data_id.insert(data_id.clone(), cpt.clone());
        }
        by_data_id.retain(|data_id, _| !self.masked.contains(data_id));

        let mut components: Vec<Component> = by_data_id.into_values().collect();
        if self.resolve_addons {
            resolve_addons(&mut components);
        }
        components
    }

    fn filtered<F>(&self, predicate: F) -> Vec<Component>
    where
        F: Fn(&Component) -> bool,
    {
        self.view().iter().filter(|cpt| predicate(cpt)).cloned().collect()
    }
}

fn resolve_addons(components: &mut [Component]) {
    let mut addons_for: HashMap<String, Vec<String>> = HashMap::new();
    for cpt in components.iter().filter(|cpt| cpt.kind == ComponentKind::Addon) {
        for extended in &cpt.extends {
            addons_for
                .entry(extended.clone())
                .or_default()
                .push(cpt.data_id());
        }
    }
    for cpt in components.iter_mut() {
        if let Some(addons) = addons_for.get(&cpt.id) {
            for addon in addons {
                if !cpt.addons.contains(addon) {
                    cpt.addons.push(addon.clone());
                }
            }
        }
    }
}

impl ComponentCache for SectionCache {
    fn set_locale(&mut self, locale: &str) {
        if self.locale != locale {
            self.locale = locale.to_string();
            self.sections.clear();
            self.invalidate();
        }
    }

    fn locale(&self) -> &str {
        &self.locale
    }

    fn set_locations(&mut self, system_dir: Option<PathBuf>, user_dir: Option<PathBuf>) {
        self.system_dir = system_dir;
        self.user_dir = user_dir;
    }

    fn set_prefer_os_metainfo(&mut self, prefer: bool) {
        if self.prefer_os_metainfo != prefer {
            self.prefer_os_metainfo = prefer;
            self.invalidate();
        }
    }

    fn set_resolve_addons(&mut self, resolve: bool) {
        if self.resolve_addons != resolve {
            self.resolve_addons = resolve;
            self.invalidate();
        }
    }

    fn set_refine_func(&mut self, refine: Option<RefineFn>) {
        self.refine = refine;
    }

    fn set_contents_for_section(
        &mut self,
        section: &SectionSpec,
        components: Vec<Component>,
        ctx: &RefineContext,
    ) -> Result<()> {
        let Some(user_dir) = self.user_dir.clone() else {
            return Err(PoolError::TargetNotWritable(
                self.system_dir.clone().unwrap_or_default(),
            ));
        };
        let path = self.section_path(&user_dir, section.scope, &section.cache_key);
        let key = SectionKey::Keyed {
            scope: section.scope,
            cache_key: section.cache_key.clone(),
        };
        self.store(key, &path, Some(section), components, ctx)
    }

    fn set_contents_for_path(&mut self, components: Vec<Component>, path: &Path, ctx: &RefineContext) -> Result<()> {
        self.store(SectionKey::Path(path.to_path_buf()), path, None, components, ctx)
    }

    fn load_section_for_key(&mut self, section: &SectionSpec, ctx: &RefineContext) -> Result<SectionLoad> {
        let candidates = self
            .stored_copies(section.scope, &section.cache_key)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        let key = SectionKey::Keyed {
            scope: section.scope,
            cache_key: section.cache_key.clone(),
        };
        Ok(self.load(key, candidates, &section.cache_key, ctx))
    }

    fn load_section_for_path(&mut self, path: &Path, ctx: &RefineContext) -> Result<SectionLoad> {
        let expected_key = path.display().to_string();
        Ok(self.load(
            SectionKey::Path(path.to_path_buf()),
            vec![path.to_path_buf()],
            &expected_key,
            ctx,
        ))
    }

    fn ctime(&self, scope: ComponentScope, cache_key: &str) -> Option<SystemTime> {
        self.stored_copies(scope, cache_key)
            .first()
            .map(|(_, mtime)| *mtime)
    }

    fn prune_data(&mut self) {
        let Some(user_dir) = &self.user_dir else {
            return;
        };
        let active: HashSet<PathBuf> = self
            .sections
            .keys()
            .filter_map(|key| match key {
                SectionKey::Keyed { scope, cache_key } => {
                    Some(self.section_path(user_dir, *scope, cache_key))
                }
                SectionKey::Path(_) => None,
            })
            .collect();

        let Ok(locales) = fs::read_dir(user_dir) else {
            return;
        };
        let now = SystemTime::now();
        for locale_dir in locales.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
            let Ok(entries) = fs::read_dir(&locale_dir) else {
                continue;
            };
            for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let stale_tmp = name.ends_with(TMP_SUFFIX);
                let expired = name.ends_with(SECTION_SUFFIX)
                    && !active.contains(&path)
                    && file_mtime(&path)
                        .and_then(|mtime| now.duration_since(mtime).ok())
                        .is_some_and(|age| age > PRUNE_MAX_AGE);
                if stale_tmp || expired {
                    match fs::remove_file(&path) {
                        Ok(()) => log::debug!("pruned cache file {}", path.display()),
                        Err(error) => {
                            log::warn!("failed to prune cache file {}: {error}", path.display())
                        }
                    }
                }
            }
        }
    }

    fn remove_section(&mut self, scope: ComponentScope, cache_key: &str) {
        let key = SectionKey::Keyed {
            scope,
            cache_key: cache_key.to_string(),
        };
        if self.sections.remove(&key).is_some() {
            self.invalidate();
        }
    }

    fn clear(&mut self) {
        self.sections.clear();
        self.masking.clear();
        self.masked.clear();
        self.invalidate();
    }

    fn add_masking_components(&mut self, components: Vec<Component>) -> Result<()> {
        for cpt in components {
            let data_id = cpt.data_id();
            self.masked.remove(&data_id);
            self.masking.insert(data_id, cpt);
        }
        self.invalidate();
        Ok(())
    }

    fn mask_by_data_id(&mut self, data_id: &str) {
        self.masked.insert(data_id.to_string());
        self.invalidate();
    }

    fn components_all(&self) -> Result<Vec<Component>> {
        Ok(self.view().to_vec())
    }

    fn components_by_id(&self, id: &str) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| cpt.id == id))
    }

    fn components_by_kind(&self, kind: ComponentKind) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| cpt.kind == kind))
    }

    fn components_by_extends(&self, extends_id: &str) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| cpt.extends.iter().any(|id| id == extends_id)))
    }

    fn components_by_provided_item(&self, kind: ProvidedKind, item: &str) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| {
            cpt.provided_for_kind(kind)
                .is_some_and(|provided| provided.items.iter().any(|entry| entry == item))
        }))
    }

    fn components_by_categories(&self, categories: &[String]) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| {
            categories
                .iter()
                .any(|category| cpt.categories.iter().any(|own| own.eq_ignore_ascii_case(category)))
        }))
    }

    fn components_by_launchable(&self, kind: LaunchableKind, entry: &str) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| {
            cpt.launchable_for_kind(kind)
                .is_some_and(|launchable| launchable.entries.iter().any(|own| own == entry))
        }))
    }

    fn components_by_bundle_id(&self, kind: BundleKind, bundle_id: &str, match_prefix: bool) -> Result<Vec<Component>> {
        Ok(self.filtered(|cpt| {
            cpt.bundle_for_kind(kind).is_some_and(|bundle| {
                if match_prefix {
                    bundle.id.starts_with(bundle_id)
                } else {
                    bundle.id == bundle_id
                }
            })
        }))
    }

    fn search(&self, tokens: &[String], sort: bool) -> Result<Vec<Component>> {
        let mut results: Vec<Component> = self
            .view()
            .iter()
            .cloned()
            .filter_map(|mut cpt| (cpt.search_matches_all(tokens) > 0).then_some(cpt))
            .collect();
        if sort {
            results.sort_by(|a, b| b.sort_score.cmp(&a.sort_score).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(results)
    }

    fn count(&self) -> usize {
        self.view().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::component::Icon;

    fn app(id: &str, name: &str) -> Component {
        let mut cpt = Component::new(id, ComponentKind::DesktopApp);
        cpt.scope = ComponentScope::System;
        cpt.name = Some(name.to_string());
        cpt.summary = Some(format!("{name} summary"));
        cpt
    }

    fn spec(key: &str, style: FormatStyle) -> SectionSpec {
        SectionSpec {
            scope: ComponentScope::System,
            format_style: style,
            is_os_data: true,
            cache_key: key.to_string(),
        }
    }

    fn cache_in(dir: &Path) -> SectionCache {
        let mut cache = SectionCache::new("C");
        cache.set_locations(Some(dir.join("system")), Some(dir.join("user")));
        cache
    }

    #[test]
    fn section_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RefineContext::default();
        let components = vec![app("org.example.A", "A"), app("org.example.B", "B")];

        let mut writer = cache_in(dir.path());
        writer
            .set_contents_for_section(&spec("os-catalog", FormatStyle::Catalog), components.clone(), &ctx)
            .expect("write");
        assert!(writer.ctime(ComponentScope::System, "os-catalog").is_some());

        let mut reader = cache_in(dir.path());
        let loaded = reader
            .load_section_for_key(&spec("os-catalog", FormatStyle::Catalog), &ctx)
            .expect("load");
        assert!(!loaded.is_outdated);

        let mut got = reader.components_all().expect("all");
        got.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(got, components);
    }

    #[test]
    fn locale_mismatch_marks_section_outdated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RefineContext::default();
        let mut cache = cache_in(dir.path());
        cache
            .set_contents_for_path(vec![app("a.b.C", "C")], &dir.path().join("p.bin.zst"), &ctx)
            .expect("write");

        cache.set_locale("de_DE");
        let loaded = cache
            .load_section_for_path(&dir.path().join("p.bin.zst"), &ctx)
            .expect("load");
        assert!(loaded.is_outdated);
        assert!(cache.is_empty());

        let missing = cache
            .load_section_for_key(&spec("nothing", FormatStyle::Catalog), &ctx)
            .expect("load");
        assert!(missing.is_outdated);
    }

    #[test]
    fn invalid_and_merge_components_are_not_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache_in(dir.path());
        let mut merge = app("org.example.A", "A");
        merge.merge_kind = crate::component::MergeKind::Append;
        let invalid = Component::new("org.example.Bad", ComponentKind::DesktopApp);

        cache
            .set_contents_for_section(
                &spec("k", FormatStyle::Catalog),
                vec![app("org.example.Good", "G"), merge, invalid],
                &RefineContext::default(),
            )
            .expect("write");
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn missing_user_dir_is_not_writable() {
        let mut cache = SectionCache::new("C");
        let error = cache
            .set_contents_for_section(&spec("k", FormatStyle::Catalog), Vec::new(), &RefineContext::default())
            .expect_err("no user dir");
        assert!(matches!(error, PoolError::TargetNotWritable(_)));
    }

    #[test]
    fn catalog_shadows_os_metainfo_unless_preferred() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RefineContext::default();
        let mut cache = cache_in(dir.path());
        cache
            .set_contents_for_section(&spec("os-catalog", FormatStyle::Catalog), vec![app("a.b.C", "Catalog")], &ctx)
            .expect("write");
        let mut local = app("a.b.C", "Local");
        local.origin = Some("local".to_string());
        cache
            .set_contents_for_section(&spec("local-metainfo", FormatStyle::Metainfo), vec![local], &ctx)
            .expect("write");

        let names: Vec<_> = cache
            .components_by_id("a.b.C")
            .expect("query")
            .into_iter()
            .filter_map(|cpt| cpt.name)
            .collect();
        assert_eq!(names, vec!["Catalog".to_string()]);

        cache.set_prefer_os_metainfo(true);
        let names: Vec<_> = cache
            .components_by_id("a.b.C")
            .expect("query")
            .into_iter()
            .filter_map(|cpt| cpt.name)
            .collect();
        assert_eq!(names, vec!["Local".to_string()]);
    }

    #[test]
    fn masking_components_shadow_and_mask_hides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RefineContext::default();
        let mut cache = cache_in(dir.path());
        cache
            .set_contents_for_section(&spec("k", FormatStyle::Catalog), vec![app("a.b.C", "Cached")], &ctx)
            .expect("write");

        cache
            .add_masking_components(vec![app("a.b.C", "Overlay")])
            .expect("mask");
        let all = cache.components_all().expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name.as_deref(), Some("Overlay"));

        cache.mask_by_data_id("system/*/a.b.C/*");
        assert!(cache.is_empty());
    }

    #[test]
    fn queries_follow_section_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RefineContext::default();
        let mut cache = cache_in(dir.path());
        cache
            .set_contents_for_section(&spec("one", FormatStyle::Catalog), vec![app("a.b.One", "One")], &ctx)
            .expect("write");
        assert_eq!(cache.count(), 1);

        cache
            .set_contents_for_section(&spec("two", FormatStyle::Catalog), vec![app("a.b.Two", "Two")], &ctx)
            .expect("write");
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.components_by_id("a.b.Two").expect("query").len(), 1);

        cache.remove_section(ComponentScope::System, "two");
        assert!(cache.components_by_id("a.b.Two").expect("query").is_empty());
        assert_eq!(cache.count(), 1);
        assert!(cache.ctime(ComponentScope::System, "two").is_some());
    }

    #[test]
    fn addons_are_resolved_on_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache_in(dir.path());
        let mut addon = app("a.b.Plugin", "Plugin");
        addon.kind = ComponentKind::Addon;
        addon.extends.push("a.b.Host".to_string());
        cache
            .set_contents_for_section(
                &spec("k", FormatStyle::Catalog),
                vec![app("a.b.Host", "Host"), addon],
                &RefineContext::default(),
            )
            .expect("write");

        let host = cache.components_by_id("a.b.Host").expect("query");
        assert_eq!(host[0].addons, vec!["system/*/a.b.Plugin/*".to_string()]);
        assert_eq!(cache.components_by_extends("a.b.Host").expect("query").len(), 1);

        cache.set_resolve_addons(false);
        assert!(cache.components_by_id("a.b.Host").expect("query")[0].addons.is_empty());
    }

    #[test]
    fn refine_runs_in_both_directions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache_in(dir.path());
        cache.set_refine_func(Some(Arc::new(|cpt: &mut Component, mode: RefineMode, _ctx: &RefineContext| {
            match mode {
                RefineMode::Serialize => cpt.icons.clear(),
                RefineMode::Deserialize => cpt.icons.push(Icon::stock("refined")),
            }
        })));

        let mut cpt = app("a.b.C", "C");
        cpt.icons.push(Icon::stock("original"));
        cache
            .set_contents_for_section(&spec("k", FormatStyle::Catalog), vec![cpt], &RefineContext::default())
            .expect("write");

        let all = cache.components_all().expect("all");
        assert_eq!(all[0].icons, vec![Icon::stock("refined")]);
    }

    #[test]
    fn search_sorts_by_score() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache_in(dir.path());
        let mut by_keyword = app("a.b.Other", "Other");
        by_keyword.keywords.push("editor".to_string());
        cache
            .set_contents_for_section(
                &spec("k", FormatStyle::Catalog),
                vec![by_keyword, app("a.b.Editor", "Editor"), app("a.b.Viewer", "Viewer")],
                &RefineContext::default(),
            )
            .expect("write");

        let results = cache.search(&["editor".to_string()], true).expect("search");
        let ids: Vec<_> = results.iter().map(|cpt| cpt.id.as_str()).collect();
        assert_eq!(ids, vec!["a.b.Editor", "a.b.Other"]);
    }

    #[test]
    fn prune_removes_leftover_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache_in(dir.path());
        let locale_dir = dir.path().join("user").join("C");
        fs::create_dir_all(&locale_dir).expect("mkdir");
        fs::write(locale_dir.join(".section-abc.tmp"), "x").expect("write");
        fs::write(locale_dir.join("system-fresh.bin.zst"), "x").expect("write");

        cache.prune_data();
        assert!(!locale_dir.join(".section-abc.tmp").exists());
        assert!(locale_dir.join("system-fresh.bin.zst").exists());
    }
}
