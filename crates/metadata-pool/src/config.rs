//! Pool configuration and runtime context.
//!
//! `PoolConfig` is plain serde data (JSON on disk). `PoolContext` bundles
//! the config with everything detected from the running system, and is
//! passed to the pool at construction.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::keyfile::KeyFile;
use crate::parser::{CompositeParser, MetadataParser};

pub const POOL_CONFIG_FILENAME: &str = "metadata-pool.json";

/// Words too generic to narrow a search.
pub const DEFAULT_SEARCH_GREYLIST: &str = "app;application;package;program;programme;suite;tool";

pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 800;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Roots holding `swcatalog/` or legacy `app-info/` catalog trees.
    pub catalog_prefixes: Vec<PathBuf>,
    pub metainfo_dir: PathBuf,
    pub applications_dir: PathBuf,
    pub flatpak_system_dir: PathBuf,
    pub flatpak_user_dir: Option<PathBuf>,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            catalog_prefixes: vec![
                PathBuf::from("/usr/share"),
                PathBuf::from("/var/lib"),
                PathBuf::from("/var/cache"),
            ],
            metainfo_dir: PathBuf::from("/usr/share/metainfo"),
            applications_dir: PathBuf::from("/usr/share/applications"),
            flatpak_system_dir: PathBuf::from("/var/lib/flatpak/appstream"),
            flatpak_user_dir: dirs::data_local_dir().map(|dir| dir.join("flatpak").join("appstream")),
        }
    }
}

impl DataPaths {
    /// All standard roots relocated below `root`, for sandboxes and tests.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            catalog_prefixes: vec![
                root.join("usr/share"),
                root.join("var/lib"),
                root.join("var/cache"),
            ],
            metainfo_dir: root.join("usr/share/metainfo"),
            applications_dir: root.join("usr/share/applications"),
            flatpak_system_dir: root.join("var/lib/flatpak/appstream"),
            flatpak_user_dir: Some(root.join("home/.local/share/flatpak/appstream")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLocations {
    /// Read-only cache shipped by the system.
    pub system_dir: Option<PathBuf>,
    /// Writable per-user cache.
    pub user_dir: Option<PathBuf>,
}

impl Default for CacheLocations {
    fn default() -> Self {
        Self {
            system_dir: Some(PathBuf::from("/var/cache/swcatalog/cache")),
            user_dir: dirs::cache_dir().map(|dir| dir.join("swcatalog").join("cache")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub data_paths: DataPaths,
    pub cache: CacheLocations,
    pub reload_debounce_ms: u64,
    /// Greylists keyed by language code; `C` is the fallback.
    pub search_greylist: HashMap<String, String>,
    pub os_release_path: PathBuf,
    pub appstream_conf_path: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            data_paths: DataPaths::default(),
            cache: CacheLocations::default(),
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
            search_greylist: HashMap::from([("C".to_string(), DEFAULT_SEARCH_GREYLIST.to_string())]),
            os_release_path: PathBuf::from("/etc/os-release"),
            appstream_conf_path: PathBuf::from("/etc/appstream.conf"),
        }
    }
}

impl PoolConfig {
    /// Reads a JSON config, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).map_err(|error| {
            PoolError::Internal(format!(
                "failed to read pool config {}: {error}",
                path.display()
            ))
        })?;
        serde_json::from_str(&data).map_err(|error| PoolError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|error| {
            PoolError::Serialization(format!("failed to encode pool config: {error}"))
        })?;
        fs::write(path, data).map_err(|error| {
            PoolError::Internal(format!(
                "failed to write pool config {}: {error}",
                path.display()
            ))
        })
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    /// Greylist words for a locale, trying the full locale, then the
    /// language, then `C`.
    pub fn greylist_for(&self, locale: &str) -> Vec<String> {
        let lang = locale.split('_').next().unwrap_or(locale);
        [locale, lang, "C"]
            .iter()
            .find_map(|key| self.search_greylist.get(*key))
            .map(|list| {
                list.split(';')
                    .map(str::trim)
                    .filter(|word| !word.is_empty())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Distribution details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistroDetails {
    pub id: String,
    pub name: String,
    pub version: String,
    pub screenshot_service_url: Option<String>,
    pub prefer_local_metainfo: bool,
}

impl DistroDetails {
    /// Reads `os-release` and the distro group of `appstream.conf`.
    ///
    /// Missing files leave the defaults in place.
    pub fn load(os_release: &Path, appstream_conf: &Path) -> Self {
        let mut details = DistroDetails {
            id: "unknown".to_string(),
            ..DistroDetails::default()
        };

        if let Ok(data) = fs::read_to_string(os_release) {
            for (key, value) in parse_os_release(&data) {
                match key.as_str() {
                    "ID" => details.id = value,
                    "NAME" => details.name = value,
                    "VERSION_ID" => details.version = value,
                    _ => {}
                }
            }
        }

        match KeyFile::load(appstream_conf) {
            Ok(conf) => {
                details.screenshot_service_url = conf
                    .string(&details.id, "ScreenshotUrl")
                    .map(str::to_string);
                details.prefer_local_metainfo = conf
                    .boolean(&details.id, "PreferLocalMetainfoData")
                    .unwrap_or(false);
            }
            Err(PoolError::Io(_)) => {}
            Err(error) => log::warn!("ignoring {}: {error}", appstream_conf.display()),
        }

        details
    }
}

fn parse_os_release(data: &str) -> Vec<(String, String)> {
    data.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// System detection
// ---------------------------------------------------------------------------

/// Current message locale from `LC_ALL`, `LC_MESSAGES` or `LANG`, without
/// the encoding suffix.
pub fn current_locale() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .map(|value| normalize_locale(&value))
        .unwrap_or_else(|| "C".to_string())
}

pub fn normalize_locale(value: &str) -> String {
    let base = value.split(['.', '@']).next().unwrap_or(value);
    match base {
        "" | "POSIX" => "C".to_string(),
        other => other.to_string(),
    }
}

/// Architecture name as used by Flatpak repositories.
pub fn current_arch() -> String {
    match std::env::consts::ARCH {
        "x86" => "i386".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the pool needs from its environment.
#[derive(Clone)]
pub struct PoolContext {
    pub config: PoolConfig,
    pub distro: DistroDetails,
    pub parser: Arc<dyn MetadataParser>,
    pub locale: String,
    pub arch: String,
    pub home_dir: Option<PathBuf>,
}

impl PoolContext {
    /// Detects distro, locale and architecture from the running system.
    ///
    /// Only desktop entries can be read unless a codec parser is supplied
    /// with [`PoolContext::with_parser`].
    pub fn from_environment(config: PoolConfig) -> Self {
        let distro = DistroDetails::load(&config.os_release_path, &config.appstream_conf_path);
        Self {
            config,
            distro,
            parser: Arc::new(CompositeParser::new(None)),
            locale: current_locale(),
            arch: current_arch(),
            home_dir: dirs::home_dir(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn MetadataParser>) -> Self {
        self.parser = parser;
        self
    }
}

impl std::fmt::Debug for PoolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolContext")
            .field("config", &self.config)
            .field("distro", &self.distro)
            .field("locale", &self.locale)
            .field("arch", &self.arch)
            .field("home_dir", &self.home_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(POOL_CONFIG_FILENAME);
        let mut config = PoolConfig::default();
        config.reload_debounce_ms = 100;
        config.data_paths = DataPaths::rooted_at(dir.path());
        config.save(&path).expect("save");

        assert_eq!(PoolConfig::load(&path).expect("load"), config);
    }

    #[test]
    fn missing_config_uses_defaults_and_partial_json_fills_gaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = PoolConfig::load(&dir.path().join("none.json")).expect("load");
        assert_eq!(missing.reload_debounce_ms, DEFAULT_RELOAD_DEBOUNCE_MS);

        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "reload_debounce_ms": 5 }"#).expect("write");
        let partial = PoolConfig::load(&path).expect("load");
        assert_eq!(partial.reload_debounce(), Duration::from_millis(5));
        assert_eq!(partial.os_release_path, PathBuf::from("/etc/os-release"));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{").expect("write");
        assert!(matches!(PoolConfig::load(&path), Err(PoolError::Parse { .. })));
    }

    #[test]
    fn greylist_falls_back_to_default_language() {
        let mut config = PoolConfig::default();
        config
            .search_greylist
            .insert("de".to_string(), "anwendung;programm".to_string());

        assert_eq!(config.greylist_for("de_DE"), vec!["anwendung", "programm"]);
        assert!(config.greylist_for("fr_FR").contains(&"tool".to_string()));
    }

    #[test]
    fn distro_details_read_os_release_and_conf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let os_release = dir.path().join("os-release");
        let conf = dir.path().join("appstream.conf");
        fs::write(&os_release, "NAME=\"Debian GNU/Linux\"\nID=debian\nVERSION_ID=\"12\"\n").expect("write");
        fs::write(
            &conf,
            "[debian]\nScreenshotUrl=https://screenshots.debian.net\nPreferLocalMetainfoData=true\n",
        )
        .expect("write");

        let details = DistroDetails::load(&os_release, &conf);
        assert_eq!(details.id, "debian");
        assert_eq!(details.name, "Debian GNU/Linux");
        assert_eq!(details.version, "12");
        assert_eq!(
            details.screenshot_service_url.as_deref(),
            Some("https://screenshots.debian.net")
        );
        assert!(details.prefer_local_metainfo);

        let missing = DistroDetails::load(&dir.path().join("x"), &dir.path().join("y"));
        assert_eq!(missing.id, "unknown");
        assert!(!missing.prefer_local_metainfo);
    }

    #[test]
    fn locales_drop_encoding() {
        assert_eq!(normalize_locale("de_DE.UTF-8"), "de_DE");
        assert_eq!(normalize_locale("sr_RS@latin"), "sr_RS");
        assert_eq!(normalize_locale("POSIX"), "C");
    }
}
