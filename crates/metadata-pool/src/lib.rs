//! Software metadata pool.
//!
//! This crate collects component metadata from catalog files, per-app
//! metainfo files and desktop entries:
//! - Location groups with one cache section each
//! - Priority-based merging of duplicate components
//! - Compressed on-disk cache sections
//! - Debounced file monitoring with automatic group reloads

pub mod cache;
pub mod cancel;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod keyfile;
pub mod location;
pub mod monitor;
pub mod parser;
pub mod pool;
pub mod registry;
pub mod search;

// Re-export main types
pub use cache::{ComponentCache, RefineContext, RefineMode, SectionCache, SectionSpec};
pub use cancel::CancellationToken;
pub use component::{Component, ComponentKind, ComponentScope, MergeKind, OriginKind};
pub use config::{DataPaths, DistroDetails, PoolConfig, PoolContext};
pub use error::{PoolError, Result};
pub use location::{FormatKind, FormatStyle, GroupId, LocationEntry, LocationGroup};
pub use monitor::{FileMonitor, MonitorEvent};
pub use parser::{CompositeParser, DesktopEntryParser, MetadataParser, ParseContext};
pub use pool::{LoadOptions, LoadSummary, LoadTask, Pool, PoolEvent, PoolFlags};
pub use registry::ComponentRegistry;
pub use search::build_search_tokens;
