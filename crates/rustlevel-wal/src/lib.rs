//! # rustlevel WAL (Write-Ahead Log)
//!
//! Write-ahead log for rustlevel. Every committed batch is appended as a
//! single CRC-framed record before it becomes visible, so a crash never
//! exposes half of a batch.
//!
//! ## Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of rustlevel.**
//! Depend on the main `rustlevel` crate instead.

use rustlevel_core::{Error, Result};
use std::path::PathBuf;

pub mod reader;
pub mod record;
pub mod recovery;
pub mod segment;
pub mod writer;

pub use reader::WalReader;
pub use record::{RecordType, WalRecord};
pub use recovery::{Recovered, RecoveryManager, RecoveryStats};
pub use segment::{SegmentInfo, SegmentManager};
pub use writer::WalWriter;

/// WAL configuration options
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Maximum segment size in bytes before rotation
    pub max_segment_size: u64,
    /// Directory path for WAL segments
    pub wal_dir: PathBuf,
    /// Fail recovery on any damaged record instead of truncating
    pub paranoid_checks: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            max_segment_size: rustlevel_core::options::DEFAULT_MAX_LOG_SEGMENT_SIZE,
            wal_dir: PathBuf::from("wal"),
            paranoid_checks: false,
        }
    }
}

/// WAL manager coordinates log writing, recovery and segment retirement
pub struct WalManager {
    config: WalConfig,
    writer: Option<WalWriter>,
}

impl WalManager {
    pub fn new(config: WalConfig) -> Result<Self> {
        Ok(Self {
            config,
            writer: None,
        })
    }

    /// Open the WAL for writing
    ///
    /// Appends to the newest segment, creating one that starts at
    /// `next_sequence` if the log is empty.
    pub fn open(&mut self, next_sequence: u64) -> Result<()> {
        let writer = WalWriter::open(
            &self.config.wal_dir,
            self.config.max_segment_size,
            next_sequence,
        )?;
        self.writer = Some(writer);

        Ok(())
    }

    fn writer_mut(&mut self) -> Result<&mut WalWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Precondition("WAL not opened".to_string()))
    }

    /// Append a record to the WAL, returning the bytes written
    pub fn append(&mut self, record: &WalRecord, sync: bool) -> Result<u64> {
        self.writer_mut()?.append(record, sync)
    }

    /// Sync the WAL to disk
    pub fn sync(&mut self) -> Result<()> {
        match &mut self.writer {
            Some(writer) => writer.sync(),
            None => Ok(()),
        }
    }

    /// Close the WAL
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.sync()?;
        }
        Ok(())
    }

    /// Start a fresh segment at `next_sequence` and delete every older one.
    ///
    /// Only valid once everything before `next_sequence` is durable
    /// elsewhere. Returns the number of segments removed.
    pub fn retire_before(&mut self, next_sequence: u64) -> Result<usize> {
        self.writer_mut()?.rotate(next_sequence)?;
        self.segment_manager().cleanup_before(next_sequence)
    }

    /// Recover records committed after `checkpoint_sequence`
    pub fn recover(&self, checkpoint_sequence: u64) -> Result<Recovered> {
        RecoveryManager::new(self.config.clone())?.recover(checkpoint_sequence)
    }

    /// Read every intact record, skipping damage
    pub fn salvage(&self) -> Result<Recovered> {
        RecoveryManager::new(self.config.clone())?.salvage()
    }

    /// Get statistics about the WAL
    pub fn stats(&self) -> Result<RecoveryStats> {
        RecoveryManager::new(self.config.clone())?.get_stats()
    }

    /// Get a segment manager for the WAL
    pub fn segment_manager(&self) -> SegmentManager {
        SegmentManager::new(self.config.wal_dir.clone())
    }

    /// Get the current configuration
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Check if the WAL is open for writing
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}
