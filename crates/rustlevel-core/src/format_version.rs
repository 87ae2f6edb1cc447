//! On-disk format versions for rustlevel
//!
//! Checkpoint tables and the manifest carry a magic number and a version so
//! that a store written by a newer release is rejected instead of misread.
//! Log segments are a plain run of CRC-framed records.

/// Checkpoint table format version
pub const TABLE_FORMAT_VERSION: u16 = 1;

/// Manifest format version
pub const MANIFEST_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Checkpoint table magic: "RLVT"
    pub const TABLE: u32 = 0x524C_5654;

    /// Manifest magic: "RLVM"
    pub const MANIFEST: u32 = 0x524C_564D;
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

/// Checkpoint table format version info
pub fn table_version() -> FormatVersion {
    FormatVersion {
        current: TABLE_FORMAT_VERSION,
        min_read: 1,
    }
}

/// Manifest format version info
pub fn manifest_version() -> FormatVersion {
    FormatVersion {
        current: MANIFEST_FORMAT_VERSION,
        min_read: 1,
    }
}
