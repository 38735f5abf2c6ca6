//! Refine hook installed into the cache by the pool.

use std::path::PathBuf;

use crate::cache::{RefineContext, RefineMode};
use crate::component::{Component, IconKind, Screenshot};

pub fn refine_component(cpt: &mut Component, mode: RefineMode, ctx: &RefineContext) {
    match mode {
        RefineMode::Serialize => {
            for icon in &mut cpt.icons {
                if icon.kind == IconKind::Cached {
                    icon.path = None;
                }
            }
            cpt.screenshots.retain(|shot| !shot.external);
        }
        RefineMode::Deserialize => {
            resolve_cached_icons(cpt, &ctx.icon_dirs);
            if let Some(url) = ctx.screenshot_service_url.as_deref() {
                add_service_screenshots(cpt, url);
            }
        }
    }
}

fn resolve_cached_icons(cpt: &mut Component, icon_dirs: &[PathBuf]) {
    let origin = cpt.origin.clone();
    for icon in &mut cpt.icons {
        if icon.kind != IconKind::Cached || icon.path.is_some() {
            continue;
        }
        let size = if icon.scale > 1 {
            format!("{}x{}@{}", icon.width, icon.height, icon.scale)
        } else {
            format!("{}x{}", icon.width, icon.height)
        };

        icon.path = icon_dirs.iter().find_map(|dir| {
            origin
                .as_deref()
                .map(|origin| dir.join(origin).join(&size).join(&icon.name))
                .into_iter()
                .chain(std::iter::once(dir.join(&size).join(&icon.name)))
                .find(|path| path.exists())
        });
    }
}

fn add_service_screenshots(cpt: &mut Component, service_url: &str) {
    if !cpt.screenshots.is_empty() {
        return;
    }
    let Some(pkgname) = cpt.pkgnames.first() else {
        return;
    };
    let base = service_url.trim_end_matches('/');
    cpt.screenshots.push(Screenshot {
        default: true,
        caption: None,
        urls: vec![
            format!("{base}/screenshot/{pkgname}"),
            format!("{base}/thumbnail/{pkgname}"),
        ],
        external: true,
    });
}
