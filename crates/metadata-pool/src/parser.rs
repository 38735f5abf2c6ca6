//! Metadata parsing seam.
//!
//! The pool turns source files into components through [`MetadataParser`].
//! XML and YAML codecs are supplied by the embedder; desktop entries are
//! handled natively by [`DesktopEntryParser`].

mod desktop_entry;

use std::path::Path;

use crate::component::{Component, ComponentScope};
use crate::error::{PoolError, Result};
use crate::location::{FormatKind, FormatStyle};

pub use desktop_entry::{desktop_id_to_component_id, DesktopEntryParser};

/// Information a parser may need to interpret a source file.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub locale: String,
    pub format_style: FormatStyle,
    pub scope: ComponentScope,
}

pub trait MetadataParser: Send + Sync {
    /// Parses a catalog document describing any number of components.
    fn parse_catalog(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Vec<Component>>;

    /// Parses a single-component file. `Ok(None)` means the file is valid
    /// but describes nothing that should be indexed.
    fn parse_metainfo(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Option<Component>>;
}

/// Routes desktop entries to [`DesktopEntryParser`] and everything else to
/// an optional codec parser.
pub struct CompositeParser {
    desktop: DesktopEntryParser,
    codec: Option<Box<dyn MetadataParser>>,
}

impl CompositeParser {
    pub fn new(codec: Option<Box<dyn MetadataParser>>) -> Self {
        Self {
            desktop: DesktopEntryParser::default(),
            codec,
        }
    }

    fn codec(&self, path: &Path, format: FormatKind) -> Result<&dyn MetadataParser> {
        self.codec.as_deref().ok_or_else(|| {
            PoolError::Unsupported(format!(
                "no parser registered for {format:?} data in {}",
                path.display()
            ))
        })
    }
}

impl MetadataParser for CompositeParser {
    fn parse_catalog(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Vec<Component>> {
        match format {
            FormatKind::DesktopEntry => self.desktop.parse_catalog(path, format, ctx),
            _ => self.codec(path, format)?.parse_catalog(path, format, ctx),
        }
    }

    fn parse_metainfo(&self, path: &Path, format: FormatKind, ctx: &ParseContext) -> Result<Option<Component>> {
        match format {
            FormatKind::DesktopEntry => self.desktop.parse_metainfo(path, format, ctx),
            _ => self.codec(path, format)?.parse_metainfo(path, format, ctx),
        }
    }
}
