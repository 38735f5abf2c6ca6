//! Component data model.
//!
//! A [`Component`] is one described piece of software together with its
//! provenance. The pool only inspects a handful of attributes (ids, origin,
//! merge kind, priority, scope, bundles, architecture); the descriptive
//! fields exist so merges, refines and searches have something to work on.

mod tokens;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use tokens::{tokenize_value, TokenMatch};

/// Placeholder used in data ids for unset parts.
const DATA_ID_WILDCARD: &str = "*";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentKind {
    #[default]
    Unknown,
    Generic,
    DesktopApp,
    ConsoleApp,
    WebApp,
    Addon,
    Font,
    Codec,
    InputMethod,
    Firmware,
    Driver,
    Localization,
    Service,
    Repository,
    OperatingSystem,
    IconTheme,
    Runtime,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Unknown => "unknown",
            ComponentKind::Generic => "generic",
            ComponentKind::DesktopApp => "desktop-application",
            ComponentKind::ConsoleApp => "console-application",
            ComponentKind::WebApp => "web-application",
            ComponentKind::Addon => "addon",
            ComponentKind::Font => "font",
            ComponentKind::Codec => "codec",
            ComponentKind::InputMethod => "inputmethod",
            ComponentKind::Firmware => "firmware",
            ComponentKind::Driver => "driver",
            ComponentKind::Localization => "localization",
            ComponentKind::Service => "service",
            ComponentKind::Repository => "repository",
            ComponentKind::OperatingSystem => "operating-system",
            ComponentKind::IconTheme => "icon-theme",
            ComponentKind::Runtime => "runtime",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "generic" => ComponentKind::Generic,
            "desktop" | "desktop-application" => ComponentKind::DesktopApp,
            "console-application" => ComponentKind::ConsoleApp,
            "web-application" => ComponentKind::WebApp,
            "addon" => ComponentKind::Addon,
            "font" => ComponentKind::Font,
            "codec" => ComponentKind::Codec,
            "inputmethod" => ComponentKind::InputMethod,
            "firmware" => ComponentKind::Firmware,
            "driver" => ComponentKind::Driver,
            "localization" => ComponentKind::Localization,
            "service" => ComponentKind::Service,
            "repository" => ComponentKind::Repository,
            "operating-system" => ComponentKind::OperatingSystem,
            "icon-theme" => ComponentKind::IconTheme,
            "runtime" => ComponentKind::Runtime,
            _ => ComponentKind::Unknown,
        }
    }
}

/// Where a component record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OriginKind {
    #[default]
    Unknown,
    Catalog,
    Metainfo,
    DesktopEntry,
}

/// Marks merge pseudo-components that patch other entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergeKind {
    #[default]
    None,
    Replace,
    Append,
    RemoveComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentScope {
    #[default]
    Unknown,
    System,
    User,
}

impl ComponentScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentScope::Unknown => DATA_ID_WILDCARD,
            ComponentScope::System => "system",
            ComponentScope::User => "user",
        }
    }
}

impl fmt::Display for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundleKind {
    Package,
    Flatpak,
    AppImage,
    Snap,
    Tarball,
    Cabinet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IconKind {
    Stock,
    Cached,
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaunchableKind {
    DesktopId,
    Service,
    CockpitManifest,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvidedKind {
    Library,
    Binary,
    Mediatype,
    Font,
    Modalias,
    Firmware,
    Python,
    DBus,
    Id,
}

// ---------------------------------------------------------------------------
// Nested records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub kind: BundleKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub kind: IconKind,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    /// Absolute path, attached by the refine step for cached icons.
    pub path: Option<PathBuf>,
    pub url: Option<String>,
}

impl Icon {
    pub fn stock(name: impl Into<String>) -> Self {
        Self {
            kind: IconKind::Stock,
            name: name.into(),
            width: 0,
            height: 0,
            scale: 1,
            path: None,
            url: None,
        }
    }

    pub fn cached(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            kind: IconKind::Cached,
            width,
            height,
            ..Self::stock(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launchable {
    pub kind: LaunchableKind,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provided {
    pub kind: ProvidedKind,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub default: bool,
    pub caption: Option<String>,
    pub urls: Vec<String>,
    /// Set for screenshots attached from a screenshot service rather than
    /// read from metadata.
    pub external: bool,
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub origin_kind: OriginKind,
    pub merge_kind: MergeKind,
    pub priority: i32,
    pub scope: ComponentScope,
    pub origin: Option<String>,
    pub branch: Option<String>,
    pub architecture: Option<String>,
    pub pkgnames: Vec<String>,
    pub bundles: Vec<Bundle>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub developer_name: Option<String>,
    pub project_license: Option<String>,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub icons: Vec<Icon>,
    pub launchables: Vec<Launchable>,
    pub provided: Vec<Provided>,
    pub extends: Vec<String>,
    /// Data ids of components extending this one, filled at query time.
    pub addons: Vec<String>,
    pub screenshots: Vec<Screenshot>,
    /// Set by parsers for entries that must never be shown (e.g. `NoDisplay`).
    pub ignored: bool,
    #[serde(skip)]
    pub sort_score: u32,
}

impl Component {
    pub fn new(id: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Self::default()
        }
    }

    /// Fully qualified key of this record: `scope/origin/id/branch`.
    pub fn data_id(&self) -> String {
        build_data_id(
            self.scope,
            self.origin.as_deref(),
            &self.id,
            self.branch.as_deref(),
        )
    }

    /// Checks that the essential properties carry useful data.
    ///
    /// Merge components only need an id.
    pub fn is_valid(&self) -> bool {
        if self.id.is_empty() {
            return false;
        }
        if self.merge_kind != MergeKind::None {
            return true;
        }
        if self.kind == ComponentKind::Unknown {
            return false;
        }
        has_text(&self.name) && has_text(&self.summary)
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_merge_component(&self) -> bool {
        self.merge_kind != MergeKind::None
    }

    pub fn has_bundle(&self) -> bool {
        !self.bundles.is_empty()
    }

    pub fn bundle_for_kind(&self, kind: BundleKind) -> Option<&Bundle> {
        self.bundles.iter().find(|bundle| bundle.kind == kind)
    }

    pub fn provided_for_kind(&self, kind: ProvidedKind) -> Option<&Provided> {
        self.provided.iter().find(|provided| provided.kind == kind)
    }

    pub fn launchable_for_kind(&self, kind: LaunchableKind) -> Option<&Launchable> {
        self.launchables
            .iter()
            .find(|launchable| launchable.kind == kind)
    }

    /// Applies `source` onto `self` using the source's merge kind.
    pub fn merge(&mut self, source: &Component) {
        self.merge_with_mode(source, source.merge_kind);
    }

    /// Copies data from `source` into `self`.
    ///
    /// `Append` only fills fields that are empty and adds list items that are
    /// missing. `Replace` overwrites every field the source sets. Identity
    /// fields (id, scope, origin, branch, priority) are never touched.
    pub fn merge_with_mode(&mut self, source: &Component, mode: MergeKind) {
        match mode {
            MergeKind::Append => {
                if self.kind == ComponentKind::Unknown {
                    self.kind = source.kind;
                }
                fill_missing(&mut self.name, &source.name);
                fill_missing(&mut self.summary, &source.summary);
                fill_missing(&mut self.description, &source.description);
                fill_missing(&mut self.developer_name, &source.developer_name);
                fill_missing(&mut self.project_license, &source.project_license);
                fill_missing(&mut self.architecture, &source.architecture);
                append_missing(&mut self.pkgnames, &source.pkgnames);
                append_missing(&mut self.bundles, &source.bundles);
                append_missing(&mut self.keywords, &source.keywords);
                append_missing(&mut self.categories, &source.categories);
                append_missing(&mut self.icons, &source.icons);
                append_missing(&mut self.launchables, &source.launchables);
                append_missing(&mut self.provided, &source.provided);
                append_missing(&mut self.extends, &source.extends);
                append_missing(&mut self.screenshots, &source.screenshots);
            }
            MergeKind::Replace => {
                if source.kind != ComponentKind::Unknown {
                    self.kind = source.kind;
                }
                replace_set(&mut self.name, &source.name);
                replace_set(&mut self.summary, &source.summary);
                replace_set(&mut self.description, &source.description);
                replace_set(&mut self.developer_name, &source.developer_name);
                replace_set(&mut self.project_license, &source.project_license);
                replace_set(&mut self.architecture, &source.architecture);
                replace_non_empty(&mut self.pkgnames, &source.pkgnames);
                replace_non_empty(&mut self.bundles, &source.bundles);
                replace_non_empty(&mut self.keywords, &source.keywords);
                replace_non_empty(&mut self.categories, &source.categories);
                replace_non_empty(&mut self.icons, &source.icons);
                replace_non_empty(&mut self.launchables, &source.launchables);
                replace_non_empty(&mut self.provided, &source.provided);
                replace_non_empty(&mut self.extends, &source.extends);
                replace_non_empty(&mut self.screenshots, &source.screenshots);
            }
            MergeKind::None | MergeKind::RemoveComponent => {}
        }
    }

    /// Scores a single search term against this component's tokens.
    ///
    /// Exact token hits score higher than prefix hits; `0` means no match.
    pub fn search_matches(&self, term: &str) -> u32 {
        tokens::score_term(&tokens::token_table(self), term)
    }

    /// Requires every term to match and stores the combined score in
    /// `sort_score`. An empty term list matches everything.
    pub fn search_matches_all(&mut self, terms: &[String]) -> u32 {
        self.sort_score = 0;
        if terms.is_empty() {
            self.sort_score = 1;
            return self.sort_score;
        }

        let table = tokens::token_table(self);
        let mut sum = 0;
        for term in terms {
            let score = tokens::score_term(&table, term);
            if score == 0 {
                return 0;
            }
            sum |= score;
        }
        self.sort_score = sum;
        sum
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}::{}]> name: {}",
            self.kind.as_str(),
            self.data_id(),
            self.name.as_deref().unwrap_or("")
        )
    }
}

/// Builds a data id from its parts, substituting `*` for missing ones.
pub fn build_data_id(
    scope: ComponentScope,
    origin: Option<&str>,
    id: &str,
    branch: Option<&str>,
) -> String {
    let origin = origin.filter(|value| !value.is_empty()).unwrap_or(DATA_ID_WILDCARD);
    let branch = branch.filter(|value| !value.is_empty()).unwrap_or(DATA_ID_WILDCARD);
    format!("{}/{origin}/{id}/{branch}", scope.as_str())
}

/// Architectures are compatible when equal or when either side is generic.
pub fn arch_compatible(arch1: &str, arch2: &str) -> bool {
    if arch1 == arch2 {
        return true;
    }
    matches!(arch1, "all" | "any") || matches!(arch2, "all" | "any")
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|text| !text.trim().is_empty())
}

fn fill_missing(target: &mut Option<String>, source: &Option<String>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

fn replace_set(target: &mut Option<String>, source: &Option<String>) {
    if source.is_some() {
        target.clone_from(source);
    }
}

fn append_missing<T: Clone + PartialEq>(target: &mut Vec<T>, source: &[T]) {
    for item in source {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn replace_non_empty<T: Clone>(target: &mut Vec<T>, source: &[T]) {
    if !source.is_empty() {
        *target = source.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> Component {
        let mut cpt = Component::new(id, ComponentKind::DesktopApp);
        cpt.name = Some("Foo".to_string());
        cpt.summary = Some("Does foo things".to_string());
        cpt
    }

    #[test]
    fn data_id_uses_wildcards_for_missing_parts() {
        let mut cpt = app("org.example.Foo");
        cpt.scope = ComponentScope::System;
        assert_eq!(cpt.data_id(), "system/*/org.example.Foo/*");

        cpt.origin = Some("flathub".to_string());
        cpt.branch = Some("stable".to_string());
        assert_eq!(cpt.data_id(), "system/flathub/org.example.Foo/stable");
    }

    #[test]
    fn validity_requires_name_and_summary() {
        let mut cpt = app("org.example.Foo");
        assert!(cpt.is_valid());
        cpt.summary = Some("  ".to_string());
        assert!(!cpt.is_valid());

        let mut merge = Component::new("org.example.Foo", ComponentKind::Unknown);
        merge.merge_kind = MergeKind::Append;
        assert!(merge.is_valid());
    }

    #[test]
    fn append_merge_fills_gaps_only() {
        let mut target = app("org.example.Foo");
        target.description = Some("metainfo text".to_string());

        let mut source = app("org.example.Foo");
        source.name = Some("Other".to_string());
        source.description = Some("desktop text".to_string());
        source.icons.push(Icon::stock("foo"));
        source.categories.push("Utility".to_string());

        target.merge_with_mode(&source, MergeKind::Append);
        assert_eq!(target.name.as_deref(), Some("Foo"));
        assert_eq!(target.description.as_deref(), Some("metainfo text"));
        assert_eq!(target.icons, vec![Icon::stock("foo")]);
        assert_eq!(target.categories, vec!["Utility".to_string()]);

        target.merge_with_mode(&source, MergeKind::Append);
        assert_eq!(target.icons.len(), 1);
    }

    #[test]
    fn replace_merge_overwrites_set_fields() {
        let mut target = app("org.example.Foo");
        target.categories.push("Game".to_string());

        let mut source = Component::new("org.example.Foo", ComponentKind::Unknown);
        source.merge_kind = MergeKind::Replace;
        source.summary = Some("Patched".to_string());

        target.merge(&source);
        assert_eq!(target.summary.as_deref(), Some("Patched"));
        assert_eq!(target.name.as_deref(), Some("Foo"));
        assert_eq!(target.categories, vec!["Game".to_string()]);
        assert_eq!(target.kind, ComponentKind::DesktopApp);
    }

    #[test]
    fn arch_compatibility_accepts_generic_arches() {
        assert!(arch_compatible("x86_64", "x86_64"));
        assert!(arch_compatible("all", "aarch64"));
        assert!(arch_compatible("x86_64", "any"));
        assert!(!arch_compatible("x86_64", "aarch64"));
    }

    #[test]
    fn search_requires_all_terms() {
        let mut cpt = app("org.example.Foo");
        cpt.keywords.push("editor".to_string());
        assert!(cpt.search_matches_all(&["foo".to_string(), "edit".to_string()]) > 0);
        assert_eq!(cpt.search_matches_all(&["foo".to_string(), "zzz".to_string()]), 0);
        assert_eq!(cpt.sort_score, 0);
        assert_eq!(cpt.search_matches_all(&[]), 1);
    }
}
