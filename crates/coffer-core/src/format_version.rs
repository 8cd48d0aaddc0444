//! File format versions for Coffer
//!
//! Version constants and magic numbers for the on-disk formats, so that a
//! newer build refuses files it cannot interpret instead of misreading them.

/// Snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Snapshot magic: "CFSN" (CoFfer SNapshot)
    pub const SNAPSHOT: u32 = 0x4346534E;
}

/// Version compatibility information
#[derive(Debug, Clone, Copy)]
pub struct FormatVersion {
    /// Current version of this format
    pub current: u16,
    /// Minimum supported version for reading
    pub min_read: u16,
}

impl FormatVersion {
    /// Check if a version can be read
    pub fn can_read(&self, version: u16) -> bool {
        version >= self.min_read && version <= self.current
    }
}

/// Snapshot format version info
pub fn snapshot_version() -> FormatVersion {
    FormatVersion {
        current: SNAPSHOT_FORMAT_VERSION,
        min_read: 1,
    }
}
