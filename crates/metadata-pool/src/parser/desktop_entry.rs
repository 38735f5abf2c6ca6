//! Desktop-entry files synthesized into components.

use std::path::Path;

use super::{MetadataParser, ParseContext};
use crate::component::{Component, ComponentKind, Icon, IconKind, Launchable, LaunchableKind, OriginKind, Provided, ProvidedKind};
use crate::error::{PoolError, Result};
use crate::keyfile::KeyFile;
use crate::location::FormatKind;

const DESKTOP_GROUP: &str = "Desktop Entry";

/// First labels that mark a reverse-DNS desktop id.
const KNOWN_TLDS: &[&str] = &[
    "org", "com", "net", "io", "de", "edu", "gov", "info", "uk", "fr", "eu", "dev", "app", "me",
    "ch", "at", "nl", "ca", "us", "ru", "it", "be", "se", "page", "space", "xyz", "im", "tk",
];

const STOCK_ICON_SUFFIXES: &[&str] = &[".png", ".xpm", ".svg", ".svgz"];

#[derive(Debug, Clone)]
pub struct DesktopEntryParser {
    /// Read `NoDisplay`/`Hidden`/`OnlyShowIn` entries and mark them ignored
    /// instead of skipping them. Metainfo data may still reference them.
    pub keep_hidden: bool,
}

impl Default for DesktopEntryParser {
    fn default() -> Self {
        Self { keep_hidden: true }
    }
}

impl DesktopEntryParser {
    pub fn parse_file(&self, path: &Path, locale: &str) -> Result<Option<Component>> {
        let basename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PoolError::Parse {
                path: path.to_path_buf(),
                message: "unable to determine desktop-entry id".to_string(),
            })?;
        let keyfile = KeyFile::load(path)?;
        self.parse_keyfile(&keyfile, basename, locale)
            .map_err(|message| PoolError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }

    pub fn parse_keyfile(
        &self,
        keyfile: &KeyFile,
        basename: &str,
        locale: &str,
    ) -> std::result::Result<Option<Component>, String> {
        if !keyfile.has_group(DESKTOP_GROUP) {
            return Err(format!("{basename} does not contain a valid Desktop Entry"));
        }
        if !keyfile
            .string(DESKTOP_GROUP, "Type")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("application"))
        {
            return Ok(None);
        }
        if keyfile.boolean(DESKTOP_GROUP, "X-AppStream-Ignore") == Some(true) {
            return Ok(None);
        }

        let hidden = keyfile.boolean(DESKTOP_GROUP, "NoDisplay") == Some(true)
            || keyfile.boolean(DESKTOP_GROUP, "Hidden") == Some(true)
            || keyfile.string(DESKTOP_GROUP, "OnlyShowIn").is_some();
        if hidden && !self.keep_hidden {
            return Ok(None);
        }

        let mut cpt = Component::new(desktop_id_to_component_id(basename), ComponentKind::DesktopApp);
        cpt.origin_kind = OriginKind::DesktopEntry;
        cpt.ignored = hidden;
        cpt.name = keyfile
            .locale_string(DESKTOP_GROUP, "Name", locale)
            .map(str::to_string);
        cpt.summary = keyfile
            .locale_string(DESKTOP_GROUP, "Comment", locale)
            .map(str::to_string);
        cpt.categories = keyfile
            .string_list(DESKTOP_GROUP, "Categories")
            .into_iter()
            .filter(|category| !category.starts_with("X-"))
            .collect();
        cpt.keywords = keyfile.locale_string_list(DESKTOP_GROUP, "Keywords", locale);

        let mediatypes = keyfile.string_list(DESKTOP_GROUP, "MimeType");
        if !mediatypes.is_empty() {
            cpt.provided.push(Provided {
                kind: ProvidedKind::Mediatype,
                items: mediatypes,
            });
        }

        if let Some(icon) = keyfile.string(DESKTOP_GROUP, "Icon") {
            cpt.icons.push(desktop_icon(icon));
        }

        cpt.launchables.push(Launchable {
            kind: LaunchableKind::DesktopId,
            entries: vec![basename.to_string()],
        });
        // any other data source wins against a bare desktop entry
        cpt.priority = i32::MIN;

        Ok(Some(cpt))
    }
}

impl MetadataParser for DesktopEntryParser {
    fn parse_catalog(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Vec<Component>> {
        Ok(self.parse_metainfo(path, format, ctx)?.into_iter().collect())
    }

    fn parse_metainfo(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Option<Component>> {
        if format != FormatKind::DesktopEntry {
            return Err(PoolError::Unsupported(format!(
                "desktop-entry parser cannot read {format:?} data from {}",
                path.display()
            )));
        }
        let mut cpt = self.parse_file(path, &ctx.locale)?;
        if let Some(cpt) = cpt.as_mut() {
            cpt.scope = ctx.scope;
        }
        Ok(cpt)
    }
}

/// Strips the `.desktop` suffix from reverse-DNS desktop ids.
pub fn desktop_id_to_component_id(basename: &str) -> String {
    let Some(stem) = basename.strip_suffix(".desktop") else {
        return basename.to_string();
    };
    let mut parts = stem.splitn(3, '.');
    let (Some(tld), Some(_), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return basename.to_string();
    };
    if KNOWN_TLDS.contains(&tld.to_ascii_lowercase().as_str()) {
        stem.to_string()
    } else {
        basename.to_string()
    }
}

fn desktop_icon(value: &str) -> Icon {
    if value.starts_with('/') {
        let mut icon = Icon::stock(value);
        icon.kind = IconKind::Local;
        icon.path = Some(value.into());
        return icon;
    }

    let name = STOCK_ICON_SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .unwrap_or(value);
    Icon::stock(name)
}
