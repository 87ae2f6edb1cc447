// WAL recovery module - handles crash recovery logic
//
// Recovery is responsible for:
// 1. Reading all WAL records from disk, oldest segment first
// 2. Skipping batches already covered by a checkpoint
// 3. Handling a damaged log: fail under paranoid checks, otherwise cut the
//    log back to the last intact record so later appends stay readable
// 4. Salvaging whatever is readable when repairing a store

use crate::record::WalRecord;
use crate::segment::SegmentManager;
use crate::{WalConfig, WalReader};
use rustlevel_core::{Error, Operation, Result};
use std::fs::OpenOptions;
use tracing::{info, warn};

/// Manages WAL recovery after crash or restart
pub struct RecoveryManager {
    config: WalConfig,
}

/// Records recovered from the log along with what recovery had to do
#[derive(Debug, Default)]
pub struct Recovered {
    /// Batches to replay, in commit order
    pub records: Vec<WalRecord>,
    /// Statistics gathered while reading
    pub stats: RecoveryStats,
}

impl RecoveryManager {
    /// Create a new recovery manager with the given configuration
    pub fn new(config: WalConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Recover batches committed after `checkpoint_sequence`.
    ///
    /// A damaged record ends recovery. With `paranoid_checks` the damage is
    /// returned as [`Error::Corruption`]; otherwise the damaged segment is
    /// truncated at the last intact record and any later segments are
    /// removed.
    pub fn recover(&self, checkpoint_sequence: u64) -> Result<Recovered> {
        let mut reader = WalReader::new(&self.config.wal_dir)?;
        let mut recovered = Recovered::default();
        recovered.stats.segment_count = reader.segment_count();

        loop {
            match reader.next_record() {
                Ok(Some(record)) => recovered.accept(record, checkpoint_sequence),
                Ok(None) => break,
                Err(e) if e.is_corruption() => {
                    if self.config.paranoid_checks {
                        return Err(e);
                    }
                    self.truncate_damaged_tail(&reader, &mut recovered.stats, &e)?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            records = recovered.records.len(),
            skipped = recovered.stats.skipped_records,
            truncated_bytes = recovered.stats.truncated_bytes,
            "WAL recovery complete"
        );

        Ok(recovered)
    }

    /// Read every intact record, skipping past damage instead of stopping.
    ///
    /// The log files are left untouched.
    pub fn salvage(&self) -> Result<Recovered> {
        let mut reader = WalReader::new(&self.config.wal_dir)?;
        let mut recovered = Recovered::default();
        recovered.stats.segment_count = reader.segment_count();

        loop {
            match reader.next_record() {
                Ok(Some(record)) => recovered.accept(record, 0),
                Ok(None) => break,
                Err(e) if e.is_corruption() => {
                    warn!(
                        segment = ?reader.current_segment_path(),
                        offset = reader.valid_offset(),
                        error = %e,
                        "Skipping damaged WAL segment tail"
                    );
                    recovered.stats.damaged_segments += 1;
                    if !reader.skip_segment()? {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    fn truncate_damaged_tail(
        &self,
        reader: &WalReader,
        stats: &mut RecoveryStats,
        cause: &Error,
    ) -> Result<()> {
        let path = match reader.current_segment_path() {
            Some(path) => path,
            None => return Ok(()),
        };

        let offset = reader.valid_offset();
        let file = OpenOptions::new().write(true).open(path)?;
        let len = file.metadata()?.len();
        file.set_len(offset)?;
        file.sync_all()?;

        let removed = SegmentManager::new(self.config.wal_dir.clone()).cleanup_after(path)?;

        warn!(
            segment = ?path,
            offset,
            dropped_bytes = len - offset,
            removed_segments = removed,
            error = %cause,
            "Truncated damaged WAL tail"
        );

        stats.truncated_bytes = len - offset;
        stats.damaged_segments = 1 + removed;
        Ok(())
    }

    /// Get statistics about the WAL without modifying it
    pub fn get_stats(&self) -> Result<RecoveryStats> {
        Ok(self.salvage()?.stats)
    }
}

impl Recovered {
    fn accept(&mut self, record: WalRecord, checkpoint_sequence: u64) {
        self.stats.total_records += 1;
        self.stats.last_sequence = self.stats.last_sequence.max(record.sequence);
        for op in &record.ops {
            match op {
                Operation::Put { .. } => self.stats.put_operations += 1,
                Operation::Delete { .. } => self.stats.delete_operations += 1,
            }
        }

        if record.sequence <= checkpoint_sequence {
            self.stats.skipped_records += 1;
        } else {
            self.records.push(record);
        }
    }
}

/// Statistics about the WAL state
#[derive(Debug, Clone, Default)]
pub struct RecoveryStats {
    /// Number of segment files
    pub segment_count: usize,
    /// Total number of intact records
    pub total_records: usize,
    /// Records already covered by the checkpoint
    pub skipped_records: usize,
    /// Number of put operations across intact records
    pub put_operations: usize,
    /// Number of delete operations across intact records
    pub delete_operations: usize,
    /// Highest sequence seen in an intact record
    pub last_sequence: u64,
    /// Bytes cut from a damaged tail
    pub truncated_bytes: u64,
    /// Segments that contained damage
    pub damaged_segments: usize,
}
