use bitflags::bitflags;

bitflags! {
    /// Controls which sources a pool reads and how it treats them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PoolFlags: u32 {
        const LOAD_OS_CATALOG = 1 << 0;
        const LOAD_OS_METAINFO = 1 << 1;
        const LOAD_OS_DESKTOP_FILES = 1 << 2;
        const LOAD_FLATPAK = 1 << 3;
        /// Always rescan sources, ignoring cache timestamps.
        const IGNORE_CACHE_AGE = 1 << 4;
        const RESOLVE_ADDONS = 1 << 5;
        /// Let OS metainfo shadow catalog entries with the same id.
        const PREFER_OS_METAINFO = 1 << 6;
        /// Watch source locations and reload groups when they change.
        const MONITOR = 1 << 7;
    }
}

impl Default for PoolFlags {
    fn default() -> Self {
        Self::LOAD_OS_CATALOG
            | Self::LOAD_OS_METAINFO
            | Self::LOAD_OS_DESKTOP_FILES
            | Self::LOAD_FLATPAK
            | Self::RESOLVE_ADDONS
    }
}
