// WAL segment management - handles cleanup and segment metadata
//
// Segments are named: wal-{sequence:016x}.log
// where sequence is the first batch sequence the segment may contain.

use rustlevel_core::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Manages WAL segment files
pub struct SegmentManager {
    wal_dir: PathBuf,
}

/// Information about a WAL segment file
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    /// Path to the segment file
    pub path: PathBuf,
    /// First sequence number the segment may hold
    pub sequence: u64,
    /// File size in bytes
    pub size: u64,
}

/// File name for the segment starting at `sequence`
pub fn segment_file_name(sequence: u64) -> String {
    format!("wal-{:016x}.log", sequence)
}

/// Parse the starting sequence out of a segment file name
pub fn parse_segment_name(name: &str) -> Option<u64> {
    let seq_str = name.strip_prefix("wal-")?.strip_suffix(".log")?;
    u64::from_str_radix(seq_str, 16).ok()
}

impl SegmentManager {
    /// Create a new segment manager for the given WAL directory
    pub fn new(wal_dir: PathBuf) -> Self {
        Self { wal_dir }
    }

    /// List all segment files in sequence order
    pub fn list_segments(&self) -> Result<Vec<SegmentInfo>> {
        if !self.wal_dir.exists() {
            return Ok(Vec::new());
        }

        let mut segments: Vec<SegmentInfo> = fs::read_dir(&self.wal_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Self::parse_segment_info(&entry.path()))
            .collect();

        segments.sort_by_key(|s| s.sequence);

        Ok(segments)
    }

    fn parse_segment_info(path: &Path) -> Option<SegmentInfo> {
        let name = path.file_name()?.to_str()?;
        let sequence = parse_segment_name(name)?;
        let size = fs::metadata(path).ok()?.len();

        Some(SegmentInfo {
            path: path.to_path_buf(),
            sequence,
            size,
        })
    }

    /// Get the total size of all segments
    pub fn total_size(&self) -> Result<u64> {
        let segments = self.list_segments()?;
        Ok(segments.iter().map(|s| s.size).sum())
    }

    /// Get the number of segment files
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.list_segments()?.len())
    }

    /// Delete segments that start before the given sequence number.
    ///
    /// Called after a checkpoint once a fresh segment starting past the
    /// checkpoint has been opened. Returns the number of segments deleted.
    pub fn cleanup_before(&self, sequence: u64) -> Result<usize> {
        let mut deleted = 0;

        for segment in self.list_segments()? {
            if segment.sequence < sequence {
                fs::remove_file(&segment.path)?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Delete every segment after `path` in sequence order.
    pub fn cleanup_after(&self, path: &Path) -> Result<usize> {
        let mut deleted = 0;
        let mut past = false;

        for segment in self.list_segments()? {
            if past {
                fs::remove_file(&segment.path)?;
                deleted += 1;
            } else if segment.path == path {
                past = true;
            }
        }

        Ok(deleted)
    }

    /// Delete all segment files
    pub fn cleanup_all(&self) -> Result<usize> {
        let segments = self.list_segments()?;
        let count = segments.len();

        for segment in segments {
            fs::remove_file(&segment.path)?;
        }

        Ok(count)
    }

    /// Get the latest (highest sequence) segment
    pub fn latest_segment(&self) -> Result<Option<SegmentInfo>> {
        let segments = self.list_segments()?;
        Ok(segments.into_iter().last())
    }

    /// Create the WAL directory if it doesn't exist
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.wal_dir)?;
        Ok(())
    }
}
