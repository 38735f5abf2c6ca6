//! Read-only pool queries.
//!
//! Every query runs under the read lock and never fails visibly: cache
//! errors are logged and turn into an empty result.

use super::Pool;
use crate::cache::ComponentCache;
use crate::component::{BundleKind, Component, ComponentKind, LaunchableKind, ProvidedKind};
use crate::error::Result;
use crate::search::build_search_tokens;

impl Pool {
    fn query<F>(&self, what: &str, run: F) -> Vec<Component>
    where
        F: FnOnce(&dyn ComponentCache) -> Result<Vec<Component>>,
    {
        let state = self.shared.state.read();
        match run(state.cache.as_ref()) {
            Ok(components) => components,
            Err(error) => {
                log::warn!("{what} query failed: {error}");
                Vec::new()
            }
        }
    }

    pub fn components(&self) -> Vec<Component> {
        self.query("components", |cache| cache.components_all())
    }

    pub fn components_by_id(&self, id: &str) -> Vec<Component> {
        self.query("components by id", |cache| cache.components_by_id(id))
    }

    pub fn components_by_kind(&self, kind: ComponentKind) -> Vec<Component> {
        self.query("components by kind", |cache| cache.components_by_kind(kind))
    }

    /// Add-ons extending the component with the given id.
    pub fn components_by_extends(&self, extends_id: &str) -> Vec<Component> {
        self.query("components by extends", |cache| {
            cache.components_by_extends(extends_id)
        })
    }

    pub fn components_by_provided_item(&self, kind: ProvidedKind, item: &str) -> Vec<Component> {
        self.query("components by provided item", |cache| {
            cache.components_by_provided_item(kind, item)
        })
    }

    /// Components in any of the given categories.
    pub fn components_by_categories(&self, categories: &[String]) -> Vec<Component> {
        self.query("components by categories", |cache| {
            cache.components_by_categories(categories)
        })
    }

    pub fn components_by_launchable(&self, kind: LaunchableKind, entry: &str) -> Vec<Component> {
        self.query("components by launchable", |cache| {
            cache.components_by_launchable(kind, entry)
        })
    }

    pub fn components_by_bundle_id(&self, kind: BundleKind, bundle_id: &str, match_prefix: bool) -> Vec<Component> {
        self.query("components by bundle id", |cache| {
            cache.components_by_bundle_id(kind, bundle_id, match_prefix)
        })
    }

    /// Splits a query into search tokens using the greylist of the pool
    /// locale. `None` means the query is too broad to filter anything.
    pub fn build_search_tokens(&self, query: &str) -> Option<Vec<String>> {
        let state = self.shared.state.read();
        let greylist = state.context.config.greylist_for(&state.locale);
        build_search_tokens(query, &greylist)
    }

    /// Searches the pool, best matches first.
    ///
    /// Queries without usable tokens, such as a single character, return
    /// every component.
    pub fn search(&self, query: &str) -> Vec<Component> {
        let tokens = self.build_search_tokens(query);
        self.query("search", |cache| match &tokens {
            Some(tokens) => cache.search(tokens, true),
            None => cache.components_all(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.read().cache.is_empty()
    }
}
