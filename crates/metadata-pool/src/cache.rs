//! Component cache interface.
//!
//! The pool stores the merged result of each location group as one cache
//! section, keyed by scope and cache key, and answers every query from the
//! cache. [`SectionCache`] is the bundled file-backed implementation.

mod persistence;
mod section;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::component::{BundleKind, Component, ComponentKind, ComponentScope, LaunchableKind, ProvidedKind};
use crate::error::Result;
use crate::location::FormatStyle;

pub use persistence::SECTION_CACHE_VERSION;
pub use section::SectionCache;

/// Direction a component is travelling when the refine hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineMode {
    /// Before persisting: strip environment-dependent data.
    Serialize,
    /// After loading: re-attach computed data.
    Deserialize,
}

/// Per-section environment handed to the refine hook.
#[derive(Debug, Clone, Default)]
pub struct RefineContext {
    pub locale: String,
    pub icon_dirs: Vec<PathBuf>,
    /// Screenshot service base URL of the running distribution.
    pub screenshot_service_url: Option<String>,
}

pub type RefineFn = Arc<dyn Fn(&mut Component, RefineMode, &RefineContext) + Send + Sync>;

/// Addresses one cache section and describes the data it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpec {
    pub scope: ComponentScope,
    pub format_style: FormatStyle,
    pub is_os_data: bool,
    pub cache_key: String,
}

#[derive(Debug, Default)]
pub struct SectionLoad {
    pub components: Vec<Component>,
    /// Set when the stored data is missing, unreadable or was written for
    /// a different locale or format version.
    pub is_outdated: bool,
}

pub trait ComponentCache: Send + Sync {
    fn set_locale(&mut self, locale: &str);
    fn locale(&self) -> &str;
    fn set_locations(&mut self, system_dir: Option<PathBuf>, user_dir: Option<PathBuf>);
    fn set_prefer_os_metainfo(&mut self, prefer: bool);
    fn set_resolve_addons(&mut self, resolve: bool);
    fn set_refine_func(&mut self, refine: Option<RefineFn>);

    fn set_contents_for_section(
        &mut self,
        section: &SectionSpec,
        components: Vec<Component>,
        ctx: &RefineContext,
    ) -> Result<()>;
    fn set_contents_for_path(&mut self, components: Vec<Component>, path: &Path, ctx: &RefineContext) -> Result<()>;
    fn load_section_for_key(&mut self, section: &SectionSpec, ctx: &RefineContext) -> Result<SectionLoad>;
    fn load_section_for_path(&mut self, path: &Path, ctx: &RefineContext) -> Result<SectionLoad>;

    /// Modification time of the stored section, if one exists.
    fn ctime(&self, scope: ComponentScope, cache_key: &str) -> Option<SystemTime>;

    fn prune_data(&mut self);
    /// Forgets a loaded section. Stored copies stay on disk.
    fn remove_section(&mut self, scope: ComponentScope, cache_key: &str);
    fn clear(&mut self);

    /// Adds overlay components that shadow cached entries without being
    /// persisted.
    fn add_masking_components(&mut self, components: Vec<Component>) -> Result<()>;
    fn mask_by_data_id(&mut self, data_id: &str);

    fn components_all(&self) -> Result<Vec<Component>>;
    fn components_by_id(&self, id: &str) -> Result<Vec<Component>>;
    fn components_by_kind(&self, kind: ComponentKind) -> Result<Vec<Component>>;
    fn components_by_extends(&self, extends_id: &str) -> Result<Vec<Component>>;
    fn components_by_provided_item(&self, kind: ProvidedKind, item: &str) -> Result<Vec<Component>>;
    fn components_by_categories(&self, categories: &[String]) -> Result<Vec<Component>>;
    fn components_by_launchable(&self, kind: LaunchableKind, entry: &str) -> Result<Vec<Component>>;
    fn components_by_bundle_id(&self, kind: BundleKind, bundle_id: &str, match_prefix: bool) -> Result<Vec<Component>>;
    fn search(&self, tokens: &[String], sort: bool) -> Result<Vec<Component>>;

    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
