//! Decides which component becomes authoritative for a data id.
//!
//! Every scan pass feeds its components through [`add_component`]. The
//! outcome only depends on component attributes (priority, origin kind,
//! bundles, architecture), except for the first-match-wins cases at equal
//! priority.

use crate::component::{arch_compatible, build_data_id, Component, MergeKind, OriginKind};
use crate::error::{PoolError, Result};
use crate::registry::ComponentRegistry;

const DESKTOP_SUFFIX: &str = ".desktop";

/// Knobs that change how collisions are resolved.
#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    /// Report ignored components and lower/equal priority collisions as
    /// errors instead of silently dropping the candidate.
    pub pedantic: bool,
    /// Let metainfo data replace existing entries, keeping their package
    /// and bundle information.
    pub prefer_local_metainfo: bool,
    pub current_arch: String,
}

/// What happened to a candidate component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored under a data id that was free.
    Inserted,
    /// Took the place of an existing entry.
    Replaced,
    /// Its data was folded into the existing entry with this data id.
    MergedInto(String),
    /// Dropped in favour of the existing entry.
    Discarded,
    /// A merge component applied to this many entries.
    Merged { targets: usize },
}

// ---------------------------------------------------------------------------
// Single component
// ---------------------------------------------------------------------------

pub fn add_component(
    registry: &mut ComponentRegistry,
    mut candidate: Component,
    policy: &MergePolicy,
) -> Result<AddOutcome> {
    let data_id = candidate.data_id();
    if candidate.is_ignored() {
        if policy.pedantic {
            return Err(PoolError::Ignored(data_id));
        }
        log::debug!("skipping ignored component {data_id}");
        return Ok(AddOutcome::Discarded);
    }

    if candidate.is_merge_component() {
        return Ok(apply_merge_component(registry, &candidate));
    }

    let Some(existing_key) = find_existing(registry, &candidate, &data_id) else {
        registry.add(candidate);
        return Ok(AddOutcome::Inserted);
    };
    let Some(existing) = registry.lookup(&existing_key) else {
        registry.add(candidate);
        return Ok(AddOutcome::Inserted);
    };

    if !existing.is_valid() {
        log::debug!("replacing invalid component {existing_key} with {data_id}");
        replace(registry, &existing_key, candidate);
        return Ok(AddOutcome::Replaced);
    }

    let existing_origin = existing.origin_kind;
    if existing_origin == OriginKind::DesktopEntry {
        if candidate.origin_kind == OriginKind::Metainfo {
            if let Some(desktop) = registry.remove(&existing_key) {
                candidate.merge_with_mode(&desktop, MergeKind::Append);
            }
            log::debug!("replaced {existing_key} with metainfo and desktop-entry data");
            registry.add(candidate);
            return Ok(AddOutcome::Replaced);
        }
        if let Some(existing) = registry.lookup_mut(&existing_key) {
            existing.priority = i32::MIN;
        }
    } else if candidate.origin_kind == OriginKind::DesktopEntry {
        match existing_origin {
            OriginKind::Metainfo => {
                if let Some(existing) = registry.lookup_mut(&existing_key) {
                    existing.merge_with_mode(&candidate, MergeKind::Append);
                }
                log::debug!("merged desktop-entry data into metainfo data for {existing_key}");
                return Ok(AddOutcome::MergedInto(existing_key));
            }
            OriginKind::Catalog => {
                log::debug!("ignored desktop-entry component {data_id}: catalog data exists");
                return Ok(AddOutcome::Discarded);
            }
            OriginKind::Unknown | OriginKind::DesktopEntry => {}
        }
    }

    if policy.prefer_local_metainfo && candidate.origin_kind == OriginKind::Metainfo {
        if let Some(existing) = registry.lookup(&existing_key) {
            candidate.pkgnames.clone_from(&existing.pkgnames);
            candidate.bundles.clone_from(&existing.bundles);
        }
        log::debug!("replaced {existing_key} with data from metainfo file");
        replace(registry, &existing_key, candidate);
        return Ok(AddOutcome::Replaced);
    }

    resolve_by_priority(registry, existing_key, candidate, policy)
}

fn resolve_by_priority(
    registry: &mut ComponentRegistry,
    existing_key: String,
    candidate: Component,
    policy: &MergePolicy,
) -> Result<AddOutcome> {
    let Some(existing) = registry.lookup(&existing_key) else {
        registry.add(candidate);
        return Ok(AddOutcome::Inserted);
    };
    let existing_priority = existing.priority;
    let existing_has_bundle = existing.has_bundle();
    let existing_arch = existing.architecture.clone();

    if candidate.priority > existing_priority {
        log::debug!("replaced {existing_key} with data of higher priority");
        replace(registry, &existing_key, candidate);
        return Ok(AddOutcome::Replaced);
    }

    if !existing_has_bundle && candidate.has_bundle() {
        if let Some(existing) = registry.lookup_mut(&existing_key) {
            existing.bundles = candidate.bundles;
        }
        return Ok(AddOutcome::MergedInto(existing_key));
    }

    let native_candidate = candidate
        .architecture
        .as_deref()
        .is_some_and(|arch| arch_compatible(arch, &policy.current_arch));
    if native_candidate {
        if let Some(existing_arch) = existing_arch {
            if arch_compatible(&existing_arch, &policy.current_arch) {
                log::debug!("preferred native architecture entry for {existing_key} (was {existing_arch})");
                replace(registry, &existing_key, candidate);
                return Ok(AddOutcome::Replaced);
            }
            log::debug!("ignored additional entry for {existing_key} on architecture {existing_arch}");
            return Ok(AddOutcome::Discarded);
        }
    }

    if policy.pedantic {
        let reason = if candidate.priority < existing_priority {
            "a higher"
        } else {
            "the same"
        };
        return Err(PoolError::Collision(format!(
            "{} was already added with {reason} priority",
            candidate.data_id()
        )));
    }
    log::debug!("dropping colliding component {}", candidate.data_id());
    Ok(AddOutcome::Discarded)
}

/// Applies a merge component to every entry sharing its id. With no
/// matching entry this does nothing.
fn apply_merge_component(registry: &mut ComponentRegistry, merge: &Component) -> AddOutcome {
    let mut targets = 0;
    for data_id in registry.data_ids_for_id(&merge.id) {
        if merge.merge_kind == MergeKind::RemoveComponent {
            let lower = registry
                .lookup(&data_id)
                .is_some_and(|target| target.priority < merge.priority);
            if lower {
                registry.remove(&data_id);
                log::debug!("removed via merge component: {data_id}");
                targets += 1;
            }
        } else if let Some(target) = registry.lookup_mut(&data_id) {
            target.merge(merge);
            targets += 1;
        }
    }
    AddOutcome::Merged { targets }
}

/// Finds the registry key a candidate collides with.
///
/// Desktop-entry ids may carry a `.desktop` suffix or not, so the toggled
/// id is probed too; that match only counts when one side came from a
/// desktop entry.
fn find_existing(registry: &ComponentRegistry, candidate: &Component, data_id: &str) -> Option<String> {
    if registry.lookup(data_id).is_some() {
        return Some(data_id.to_string());
    }

    let toggled = match candidate.id.strip_suffix(DESKTOP_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => format!("{}{DESKTOP_SUFFIX}", candidate.id),
    };
    let toggled_key = build_data_id(
        candidate.scope,
        candidate.origin.as_deref(),
        &toggled,
        candidate.branch.as_deref(),
    );
    let existing = registry.lookup(&toggled_key)?;
    let desktop_pair = candidate.origin_kind == OriginKind::DesktopEntry
        || existing.origin_kind == OriginKind::DesktopEntry;
    desktop_pair.then_some(toggled_key)
}

fn replace(registry: &mut ComponentRegistry, existing_key: &str, candidate: Component) {
    if candidate.data_id() != existing_key {
        registry.remove(existing_key);
    }
    registry.add(candidate);
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Adds regular components first and merge components second, so merges
/// always see their targets. Returns the per-component failures.
pub fn add_components_two_pass(
    registry: &mut ComponentRegistry,
    components: Vec<Component>,
    policy: &MergePolicy,
) -> Vec<PoolError> {
    let (merges, regular): (Vec<Component>, Vec<Component>) = components
        .into_iter()
        .partition(Component::is_merge_component);

    let mut errors = Vec::new();
    for component in regular.into_iter().chain(merges) {
        if let Err(error) = add_component(registry, component, policy) {
            errors.push(error);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Bundle, BundleKind, ComponentKind, Icon};

    fn app(id: &str, origin_kind: OriginKind, priority: i32) -> Component {
        let mut cpt = Component::new(id, ComponentKind::DesktopApp);
        cpt.name = Some(format!("{id} name"));
        cpt.summary = Some(format!("{id} summary"));
        cpt.origin_kind = origin_kind;
        cpt.priority = priority;
        cpt
    }

    fn metainfo(id: &str) -> Component {
        let mut cpt = app(id, OriginKind::Metainfo, 0);
        cpt.description = Some("From metainfo".to_string());
        cpt
    }

    fn desktop(id: &str) -> Component {
        let mut cpt = app(id, OriginKind::DesktopEntry, i32::MIN);
        cpt.description = Some("From desktop entry".to_string());
        cpt.icons.push(Icon::stock("foo"));
        cpt
    }

    fn lenient() -> MergePolicy {
        MergePolicy {
            current_arch: "x86_64".to_string(),
            ..MergePolicy::default()
        }
    }

    fn pedantic() -> MergePolicy {
        MergePolicy {
            pedantic: true,
            ..lenient()
        }
    }

    #[test]
    fn higher_priority_wins_in_either_order() {
        for reverse in [false, true] {
            let mut low = app("app.X", OriginKind::Catalog, 1);
            low.summary = Some("low".to_string());
            let mut high = app("app.X", OriginKind::Catalog, 5);
            high.summary = Some("high".to_string());
            let order = if reverse { vec![high, low] } else { vec![low, high] };

            let mut registry = ComponentRegistry::new();
            for cpt in order {
                add_component(&mut registry, cpt, &lenient()).expect("add");
            }
            assert_eq!(registry.len(), 1);
            let survivor = &registry.get_by_id("app.X")[0];
            assert_eq!(survivor.summary.as_deref(), Some("high"));
        }
    }

    #[test]
    fn metainfo_and_desktop_entry_combine_in_any_order() {
        let pairs = [
            ("org.example.Foo", "org.example.Foo"),
            ("org.example.Foo", "org.example.Foo.desktop"),
            ("org.example.Foo.desktop", "org.example.Foo"),
        ];
        for (metainfo_id, desktop_id) in pairs {
            for desktop_first in [false, true] {
                let mut registry = ComponentRegistry::new();
                let (first, second) = if desktop_first {
                    (desktop(desktop_id), metainfo(metainfo_id))
                } else {
                    (metainfo(metainfo_id), desktop(desktop_id))
                };
                add_component(&mut registry, first, &lenient()).expect("first");
                add_component(&mut registry, second, &lenient()).expect("second");

                assert_eq!(registry.len(), 1, "{metainfo_id} / {desktop_id}");
                let survivor = registry.contents().remove(0);
                assert_eq!(survivor.description.as_deref(), Some("From metainfo"));
                assert_eq!(survivor.origin_kind, OriginKind::Metainfo);
                assert!(!survivor.icons.is_empty());
            }
        }
    }

    #[test]
    fn desktop_entry_never_replaces_catalog_data() {
        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, app("org.example.Foo", OriginKind::Catalog, 0), &lenient())
            .expect("catalog");
        let outcome = add_component(&mut registry, desktop("org.example.Foo"), &lenient()).expect("desktop");
        assert_eq!(outcome, AddOutcome::Discarded);

        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, desktop("org.example.Foo"), &lenient()).expect("desktop");
        let outcome = add_component(&mut registry, app("org.example.Foo", OriginKind::Catalog, 0), &lenient())
            .expect("catalog");
        assert_eq!(outcome, AddOutcome::Replaced);
        assert_eq!(registry.contents()[0].origin_kind, OriginKind::Catalog);
    }

    #[test]
    fn merge_component_without_target_is_noop() {
        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, app("app.Other", OriginKind::Catalog, 0), &lenient()).expect("add");

        let mut merge = Component::new("app.Missing", ComponentKind::Unknown);
        merge.merge_kind = MergeKind::Replace;
        merge.summary = Some("patched".to_string());
        let outcome = add_component(&mut registry, merge, &pedantic()).expect("merge");
        assert_eq!(outcome, AddOutcome::Merged { targets: 0 });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn merge_components_patch_or_remove_targets() {
        let mut registry = ComponentRegistry::new();
        let mut replace = Component::new("app.X", ComponentKind::Unknown);
        replace.merge_kind = MergeKind::Replace;
        replace.summary = Some("patched".to_string());
        let errors = add_components_two_pass(
            &mut registry,
            vec![replace, app("app.X", OriginKind::Catalog, 0)],
            &lenient(),
        );
        assert!(errors.is_empty());
        assert_eq!(registry.get_by_id("app.X")[0].summary.as_deref(), Some("patched"));

        let mut remove = Component::new("app.X", ComponentKind::Unknown);
        remove.merge_kind = MergeKind::RemoveComponent;
        remove.priority = 0;
        let outcome = add_component(&mut registry, remove.clone(), &lenient()).expect("remove");
        assert_eq!(outcome, AddOutcome::Merged { targets: 0 });
        assert_eq!(registry.len(), 1);

        remove.priority = 10;
        add_component(&mut registry, remove, &lenient()).expect("remove");
        assert!(registry.is_empty());
        assert!(!registry.has_id("app.X"));
    }

    #[test]
    fn equal_priority_collision_depends_on_pedantic() {
        let mut registry = ComponentRegistry::new();
        let mut first = app("app.X", OriginKind::Catalog, 0);
        first.summary = Some("first".to_string());
        add_component(&mut registry, first.clone(), &pedantic()).expect("first");
        let result = add_component(&mut registry, app("app.X", OriginKind::Catalog, 0), &pedantic());
        assert!(matches!(result, Err(PoolError::Collision(_))));

        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, first, &lenient()).expect("first");
        let outcome = add_component(&mut registry, app("app.X", OriginKind::Catalog, 0), &lenient())
            .expect("second");
        assert_eq!(outcome, AddOutcome::Discarded);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_id("app.X")[0].summary.as_deref(), Some("first"));
    }

    #[test]
    fn lower_priority_is_reported_only_when_pedantic() {
        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, app("app.X", OriginKind::Catalog, 5), &lenient()).expect("add");
        assert!(matches!(
            add_component(&mut registry, app("app.X", OriginKind::Catalog, 1), &pedantic()),
            Err(PoolError::Collision(_))
        ));
        assert_eq!(
            add_component(&mut registry, app("app.X", OriginKind::Catalog, 1), &lenient()).expect("add"),
            AddOutcome::Discarded
        );
    }

    #[test]
    fn ignored_components_are_dropped() {
        let mut registry = ComponentRegistry::new();
        let mut hidden = app("app.X", OriginKind::Catalog, 0);
        hidden.ignored = true;
        assert!(matches!(
            add_component(&mut registry, hidden.clone(), &pedantic()),
            Err(PoolError::Ignored(_))
        ));
        assert_eq!(
            add_component(&mut registry, hidden, &lenient()).expect("add"),
            AddOutcome::Discarded
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_entries_are_replaced() {
        let mut registry = ComponentRegistry::new();
        let mut broken = app("app.X", OriginKind::Catalog, 10);
        broken.name = None;
        add_component(&mut registry, broken, &lenient()).expect("broken");
        let outcome = add_component(&mut registry, app("app.X", OriginKind::Catalog, 0), &lenient())
            .expect("valid");
        assert_eq!(outcome, AddOutcome::Replaced);
        assert!(registry.get_by_id("app.X")[0].is_valid());
    }

    #[test]
    fn bundle_and_arch_tie_breaks() {
        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, app("app.X", OriginKind::Catalog, 0), &lenient()).expect("add");
        let mut bundled = app("app.X", OriginKind::Catalog, 0);
        bundled.bundles.push(Bundle {
            kind: BundleKind::Flatpak,
            id: "app/app.X/x86_64/stable".to_string(),
        });
        let outcome = add_component(&mut registry, bundled, &lenient()).expect("bundled");
        assert!(matches!(outcome, AddOutcome::MergedInto(_)));
        assert!(registry.get_by_id("app.X")[0].has_bundle());

        let mut registry = ComponentRegistry::new();
        let mut foreign = app("app.Y", OriginKind::Catalog, 0);
        foreign.architecture = Some("aarch64".to_string());
        add_component(&mut registry, foreign, &lenient()).expect("foreign");
        let mut native = app("app.Y", OriginKind::Catalog, 0);
        native.architecture = Some("x86_64".to_string());
        let outcome = add_component(&mut registry, native, &lenient()).expect("native");
        assert_eq!(outcome, AddOutcome::Discarded);

        let mut registry = ComponentRegistry::new();
        let mut generic = app("app.Z", OriginKind::Catalog, 0);
        generic.architecture = Some("all".to_string());
        add_component(&mut registry, generic, &pedantic()).expect("generic");
        let mut native = app("app.Z", OriginKind::Catalog, 0);
        native.architecture = Some("x86_64".to_string());
        let outcome = add_component(&mut registry, native, &pedantic()).expect("native");
        assert_eq!(outcome, AddOutcome::Replaced);
        assert_eq!(
            registry.get_by_id("app.Z")[0].architecture.as_deref(),
            Some("x86_64")
        );
    }

    #[test]
    fn lower_priority_candidates_still_propagate_bundles_and_arch() {
        let mut registry = ComponentRegistry::new();
        add_component(&mut registry, app("app.X", OriginKind::Catalog, 5), &pedantic()).expect("add");
        let mut bundled = app("app.X", OriginKind::Catalog, 1);
        bundled.bundles.push(Bundle {
            kind: BundleKind::Flatpak,
            id: "app/app.X/x86_64/stable".to_string(),
        });
        let outcome = add_component(&mut registry, bundled, &pedantic()).expect("bundled");
        assert!(matches!(outcome, AddOutcome::MergedInto(_)));
        let kept = &registry.get_by_id("app.X")[0];
        assert!(kept.has_bundle());
        assert_eq!(kept.priority, 5);

        let mut registry = ComponentRegistry::new();
        let mut generic = app("app.Z", OriginKind::Catalog, 5);
        generic.architecture = Some("all".to_string());
        add_component(&mut registry, generic, &lenient()).expect("generic");
        let mut native = app("app.Z", OriginKind::Catalog, 1);
        native.architecture = Some("x86_64".to_string());
        let outcome = add_component(&mut registry, native, &lenient()).expect("native");
        assert_eq!(outcome, AddOutcome::Replaced);
        assert_eq!(registry.get_by_id("app.Z")[0].priority, 1);
    }

    #[test]
    fn prefer_local_metainfo_keeps_package_data() {
        let policy = MergePolicy {
            prefer_local_metainfo: true,
            ..lenient()
        };
        let mut registry = ComponentRegistry::new();
        let mut catalog = app("org.example.Foo", OriginKind::Catalog, 10);
        catalog.pkgnames = vec!["foo".to_string()];
        add_component(&mut registry, catalog, &policy).expect("catalog");
        let outcome = add_component(&mut registry, metainfo("org.example.Foo"), &policy).expect("metainfo");
        assert_eq!(outcome, AddOutcome::Replaced);

        let survivor = registry.contents().remove(0);
        assert_eq!(survivor.origin_kind, OriginKind::Metainfo);
        assert_eq!(survivor.pkgnames, vec!["foo".to_string()]);
    }
}
