//! Section file read/write.
//!
//! Sections are postcard-encoded and zstd-compressed, written to a
//! temporary file in the target directory and renamed into place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::thread::available_parallelism;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentScope};
use crate::error::{PoolError, Result};
use crate::location::FormatStyle;

/// Cache format version - increment when changing the format.
pub const SECTION_CACHE_VERSION: u32 = 3;

/// Suffix of in-flight section files.
pub(super) const TMP_SUFFIX: &str = ".tmp";

// ---------------------------------------------------------------------------
// Persistent storage format
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub(super) struct PersistentSection {
    pub version: u32,
    pub locale: String,
    pub cache_key: String,
    pub scope: ComponentScope,
    pub format_style: Option<FormatStyle>,
    pub is_os_data: bool,
    pub saved_at: u64,
    pub components: Vec<Component>,
}

/// What a stored section must match to be usable.
pub(super) struct SectionExpectation<'a> {
    pub locale: &'a str,
    pub cache_key: &'a str,
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

pub(super) fn write_section(path: &Path, section: &PersistentSection) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Err(PoolError::CacheWrite(format!(
            "cache path {} has no parent directory",
            path.display()
        )));
    };

    fs::create_dir_all(parent).map_err(|error| {
        if error.kind() == ErrorKind::PermissionDenied {
            PoolError::TargetNotWritable(parent.to_path_buf())
        } else {
            PoolError::CacheWrite(format!(
                "failed to create cache directory {}: {error}",
                parent.display()
            ))
        }
    })?;

    let tmp = tempfile::Builder::new()
        .prefix(".section-")
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|error| {
            if error.kind() == ErrorKind::PermissionDenied {
                PoolError::TargetNotWritable(parent.to_path_buf())
            } else {
                PoolError::CacheWrite(format!(
                    "failed to create cache file in {}: {error}",
                    parent.display()
                ))
            }
        })?;

    {
        let output = tmp.as_file().try_clone().map_err(|error| {
            PoolError::CacheWrite(format!("failed to open cache file for writing: {error}"))
        })?;

        let mut encoder = zstd::Encoder::new(output, 6).map_err(|error| {
            PoolError::CacheWrite(format!("failed to create zstd encoder: {error}"))
        })?;

        let threads = available_parallelism().map(|x| x.get() as u32).unwrap_or(4);
        encoder.multithread(threads).map_err(|error| {
            PoolError::CacheWrite(format!("failed to enable multi-threaded zstd: {error}"))
        })?;

        let output = encoder.auto_finish();
        let mut output = BufWriter::new(output);
        postcard::to_io(section, &mut output).map_err(|error| {
            PoolError::Serialization(format!("failed to encode cache section with postcard: {error}"))
        })?;
        output.flush().map_err(|error| {
            PoolError::CacheWrite(format!("failed to flush cache file {}: {error}", path.display()))
        })?;
    }

    tmp.persist(path).map_err(|error| {
        PoolError::CacheWrite(format!(
            "failed to finalize cache file {}: {}",
            path.display(),
            error.error
        ))
    })?;

    log::debug!(
        "wrote cache section {} to {} ({} components)",
        section.cache_key,
        path.display(),
        section.components.len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Loads a section file, returning `None` when it is missing, unreadable or
/// does not match the expectation.
pub(super) fn read_section(path: &Path, expect: &SectionExpectation<'_>) -> Option<PersistentSection> {
    let input = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return None,
        Err(error) => {
            log::warn!("cache section read failed for {}: {}", path.display(), error);
            return None;
        }
    };

    let decoder = match zstd::Decoder::new(input) {
        Ok(decoder) => decoder,
        Err(error) => {
            log::warn!("cache section decompress failed for {}: {}", path.display(), error);
            return None;
        }
    };

    let mut input = BufReader::new(decoder);
    let mut scratch = vec![0u8; 4 * 1024];
    let section: PersistentSection = match postcard::from_io((&mut input, &mut scratch)) {
        Ok((section, _)) => section,
        Err(error) => {
            log::warn!("cache section decode failed for {}: {}", path.display(), error);
            return None;
        }
    };

    if section.version != SECTION_CACHE_VERSION {
        log::debug!(
            "cache version mismatch: {} != {}",
            section.version,
            SECTION_CACHE_VERSION
        );
        return None;
    }
    if section.locale != expect.locale {
        log::debug!("cache locale mismatch: {} != {}", section.locale, expect.locale);
        return None;
    }
    if section.cache_key != expect.cache_key {
        log::debug!("cache key mismatch: {} != {}", section.cache_key, expect.cache_key);
        return None;
    }

    Some(section)
}

pub(super) fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

pub(super) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;

    fn section(locale: &str) -> PersistentSection {
        let mut cpt = Component::new("org.example.Foo", ComponentKind::DesktopApp);
        cpt.name = Some("Foo".to_string());
        PersistentSection {
            version: SECTION_CACHE_VERSION,
            locale: locale.to_string(),
            cache_key: "os-catalog".to_string(),
            scope: ComponentScope::System,
            format_style: Some(FormatStyle::Catalog),
            is_os_data: true,
            saved_at: unix_now_secs(),
            components: vec![cpt],
        }
    }

    #[test]
    fn written_section_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("C").join("system-os-catalog.bin.zst");
        write_section(&path, &section("C")).expect("write");

        let expect = SectionExpectation {
            locale: "C",
            cache_key: "os-catalog",
        };
        let loaded = read_section(&path, &expect).expect("section");
        assert_eq!(loaded.components, section("C").components);

        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn mismatched_locale_or_garbage_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("section.bin.zst");
        write_section(&path, &section("de_DE")).expect("write");
        let expect = SectionExpectation {
            locale: "C",
            cache_key: "os-catalog",
        };
        assert!(read_section(&path, &expect).is_none());

        fs::write(&path, b"not a cache").expect("write");
        assert!(read_section(&path, &expect).is_none());
        assert!(read_section(&dir.path().join("missing"), &expect).is_none());
    }
}
