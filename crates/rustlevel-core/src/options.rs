//! Open, read and write options.
//!
//! All option structs follow the same pattern: `Default` gives the stock
//! configuration and consuming `with_*` methods adjust it.
//!
//! ```
//! use rustlevel_core::options::{Options, ReadOptions, WriteOptions};
//!
//! let open = Options::default().with_create_if_missing(true);
//! let read = ReadOptions::default().as_buffer();
//! let write = WriteOptions::default().with_sync(true);
//! assert!(open.create_if_missing && write.sync);
//! assert!(read.format.is_buffer());
//! ```

use crate::storage::SnapshotId;

/// Default amount of log data accumulated before a checkpoint (4MB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Default WAL segment size before rotation (64MB)
pub const DEFAULT_MAX_LOG_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Default checkpoint table block size (4KB)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Options used when opening, destroying or repairing a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Create the store if it does not exist
    pub create_if_missing: bool,
    /// Fail if the store already exists
    pub error_if_exists: bool,
    /// Treat any checksum mismatch as fatal instead of truncating the log tail
    pub paranoid_checks: bool,
    /// Bytes of log written before the engine checkpoints its state
    pub write_buffer_size: usize,
    /// Maximum size of a single WAL segment
    pub max_log_segment_size: u64,
    /// Target block size of checkpoint tables
    pub block_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_log_segment_size: DEFAULT_MAX_LOG_SEGMENT_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Options {
    /// Set `create_if_missing`
    pub fn with_create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set `error_if_exists`
    pub fn with_error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Set `paranoid_checks`
    pub fn with_paranoid_checks(mut self, value: bool) -> Self {
        self.paranoid_checks = value;
        self
    }

    /// Set the checkpoint threshold in bytes of log
    pub fn with_write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Set the WAL segment rotation size
    pub fn with_max_log_segment_size(mut self, bytes: u64) -> Self {
        self.max_log_segment_size = bytes;
        self
    }

    /// Set the checkpoint table block size
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }
}

/// How bytes read from the store are handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    /// Decode as UTF-8 text (invalid sequences are replaced)
    #[default]
    Text,
    /// Return the raw bytes untouched
    Buffer,
}

impl DataFormat {
    /// Returns true for [`DataFormat::Buffer`]
    pub fn is_buffer(self) -> bool {
        matches!(self, DataFormat::Buffer)
    }
}

/// Options for point reads and cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Verify checksums of everything read from persistent storage
    pub verify_checksums: bool,
    /// Whether data read for this operation should be cached
    pub fill_cache: bool,
    /// Read as of this snapshot instead of the latest state
    pub snapshot: Option<SnapshotId>,
    /// Output format for keys and values
    pub format: DataFormat,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
            format: DataFormat::Text,
        }
    }
}

impl ReadOptions {
    /// Return raw bytes instead of decoded text
    pub fn as_buffer(mut self) -> Self {
        self.format = DataFormat::Buffer;
        self
    }

    /// Set the output format
    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    /// Set `verify_checksums`
    pub fn with_verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Set `fill_cache`
    pub fn with_fill_cache(mut self, value: bool) -> Self {
        self.fill_cache = value;
        self
    }

    /// Read from a snapshot
    pub fn with_snapshot(mut self, snapshot: SnapshotId) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// Options for writes and batch commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Force the log to stable storage before the write returns
    pub sync: bool,
}

impl WriteOptions {
    /// Set `sync`
    pub fn with_sync(mut self, value: bool) -> Self {
        self.sync = value;
        self
    }
}
