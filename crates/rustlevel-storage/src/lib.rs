//! # rustlevel storage engine
//!
//! Reference [`Engine`] implementation for rustlevel.
//!
//! ## Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of rustlevel.**
//! Depend on the main `rustlevel` crate instead.
//!
//! ---
//!
//! The engine keeps every version a reader may still need in a versioned
//! memtable and makes it durable with:
//!
//! - **WAL**: one CRC-framed record per committed batch
//! - **Checkpoint table**: a sorted image of the live key set, written once
//!   enough log has accumulated, after which the covered log segments are
//!   deleted
//! - **Manifest**: names the current checkpoint table
//!
//! ## Architecture
//!
//! ```text
//! write → WAL append → memtable (versioned) → sequence published
//!                           ↓
//!             checkpoint table when log > write_buffer_size
//! ```

use rustlevel_core::{
    Engine, EngineIterator, Error, KeyRange, Options, ReadOptions, Result, SnapshotId,
    WriteBatch, WriteOptions,
};
use rustlevel_wal::{WalConfig, WalManager, WalRecord};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod snapshot;
pub mod table;

pub use iterator::StorageIterator;
pub use manifest::{Manifest, ManifestState, MANIFEST_FILE};
pub use memtable::{Memtable, MemtableEntry};
pub use snapshot::SnapshotList;
pub use table::{TableEntry, TableMeta, TableReader, TableWriter};

/// Subdirectory holding WAL segments
pub const WAL_DIR: &str = "wal";
/// Subdirectory holding checkpoint tables
pub const TABLE_DIR: &str = "tables";

/// Property names understood by [`StorageEngine`]
pub mod properties {
    /// Number of live keys
    pub const NUM_ENTRIES: &str = "rustlevel.num-entries";
    /// Last committed sequence number
    pub const SEQUENCE: &str = "rustlevel.sequence";
    /// Multi-line statistics report
    pub const STATS: &str = "rustlevel.stats";
    /// Log bytes written since the last checkpoint
    pub const LOG_BYTES: &str = "rustlevel.log-bytes";
}

/// State guarded by the writer lock. Holding it serializes commits and
/// checkpoints.
struct WriterState {
    /// `None` for in-memory engines
    wal: Option<WalManager>,
    manifest: Option<Manifest>,
    /// Bytes committed since the last checkpoint
    log_bytes: u64,
}

/// Storage engine
///
/// Thread-safe; share it behind an `Arc`.
pub struct StorageEngine {
    dir: Option<PathBuf>,
    options: Options,
    memtable: Arc<RwLock<Memtable>>,
    writer: Mutex<WriterState>,
    /// Last committed sequence, published after the memtable is updated
    sequence: AtomicU64,
    snapshots: Arc<SnapshotList>,
    closed: AtomicBool,
    batches_written: AtomicU64,
    checkpoints_written: AtomicU64,
}

impl StorageEngine {
    /// Open the store at `path`, replaying the checkpoint table and the WAL
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        let exists = Manifest::exists(&dir);

        if exists && options.error_if_exists {
            return Err(Error::InvalidArgument(format!(
                "{}: exists (error_if_exists is true)",
                dir.display()
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(Error::NotFound(format!(
                "{}: does not exist (create_if_missing is false)",
                dir.display()
            )));
        }

        fs::create_dir_all(dir.join(WAL_DIR))?;
        fs::create_dir_all(dir.join(TABLE_DIR))?;
        manifest::remove_temp(&dir)?;

        let manifest = if exists {
            Manifest::load(&dir)?
        } else {
            info!(path = ?dir, "Creating new store");
            Manifest::create(&dir)?
        };
        remove_stale_tables(&dir, manifest.table())?;

        let checkpoint_sequence = manifest.checkpoint_sequence();
        let mut memtable = Memtable::new();
        if let Some(name) = manifest.table() {
            let path = dir.join(TABLE_DIR).join(name);
            let mut reader = TableReader::open(&path).map_err(|e| match e {
                Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    Error::Corruption(format!("checkpoint table {} is missing", name))
                }
                other => other,
            })?;
            for entry in reader.read_all()? {
                memtable.insert(
                    entry.key,
                    checkpoint_sequence,
                    MemtableEntry::Value(entry.value),
                );
            }
        }

        let mut wal = WalManager::new(WalConfig {
            wal_dir: dir.join(WAL_DIR),
            max_segment_size: options.max_log_segment_size,
            paranoid_checks: options.paranoid_checks,
        })?;
        let recovered = wal.recover(checkpoint_sequence)?;

        let mut sequence = checkpoint_sequence;
        for record in &recovered.records {
            memtable.apply(record.sequence, &record.ops);
            sequence = sequence.max(record.sequence);
        }

        wal.open(sequence + 1)?;
        let log_bytes = wal.segment_manager().total_size()?;

        info!(
            path = ?dir,
            sequence,
            checkpoint_sequence,
            replayed = recovered.records.len(),
            "Opened store"
        );

        Ok(Self {
            dir: Some(dir),
            options: options.clone(),
            memtable: Arc::new(RwLock::new(memtable)),
            writer: Mutex::new(WriterState {
                wal: Some(wal),
                manifest: Some(manifest),
                log_bytes,
            }),
            sequence: AtomicU64::new(sequence),
            snapshots: Arc::new(SnapshotList::new()),
            closed: AtomicBool::new(false),
            batches_written: AtomicU64::new(0),
            checkpoints_written: AtomicU64::new(0),
        })
    }

    /// Create a non-durable engine with the same read/write semantics
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            options: Options::default(),
            memtable: Arc::new(RwLock::new(Memtable::new())),
            writer: Mutex::new(WriterState {
                wal: None,
                manifest: None,
                log_bytes: 0,
            }),
            sequence: AtomicU64::new(0),
            snapshots: Arc::new(SnapshotList::new()),
            closed: AtomicBool::new(false),
            batches_written: AtomicU64::new(0),
            checkpoints_written: AtomicU64::new(0),
        }
    }

    /// Directory of the store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::HandleClosed);
        }
        Ok(())
    }

    fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Write a checkpoint table for the current state (when it moved since
    /// the last one), retire covered log segments, and prune old versions.
    fn checkpoint(&self, state: &mut WriterState) -> Result<()> {
        let sequence = self.current_sequence();

        if let (Some(wal), Some(manifest), Some(dir)) =
            (state.wal.as_mut(), state.manifest.as_mut(), self.dir.as_ref())
        {
            if sequence > manifest.checkpoint_sequence() {
                let meta = {
                    let memtable = self.memtable.read().map_err(|_| Error::LockPoisoned)?;
                    let path = dir.join(TABLE_DIR).join(table::table_file_name(sequence));
                    let mut writer = TableWriter::create(&path, self.options.block_size, sequence)?;
                    for (key, value) in memtable.visible(sequence) {
                        writer.add(key, value)?;
                    }
                    writer.finish()?
                };

                let previous = manifest.table().map(str::to_string);
                manifest.record_checkpoint(&meta)?;
                let retired = wal.retire_before(sequence + 1)?;
                if let Some(previous) = previous {
                    remove_file_if_exists(&dir.join(TABLE_DIR).join(previous))?;
                }

                self.checkpoints_written.fetch_add(1, Ordering::Relaxed);
                info!(
                    sequence,
                    entries = meta.entry_count,
                    bytes = meta.file_size,
                    retired_segments = retired,
                    "Wrote checkpoint"
                );
            }
        }

        state.log_bytes = 0;
        let pruned = self.prune()?;
        debug!(sequence, pruned, "Pruned memtable versions");
        Ok(())
    }

    /// Drop versions below the oldest pinned sequence
    fn prune(&self) -> Result<usize> {
        let current = self.current_sequence();
        self.snapshots.with_oldest(|oldest| {
            let floor = oldest.map_or(current, |o| o.min(current));
            self.memtable
                .write()
                .map(|mut memtable| memtable.prune(floor))
                .map_err(|_| Error::LockPoisoned)
        })?
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        let (live_entries, versions, memtable_bytes) = match self.memtable.read() {
            Ok(m) => {
                let sequence = self.current_sequence();
                (m.visible(sequence).count(), m.len(), m.size_bytes())
            }
            Err(_) => (0, 0, 0),
        };
        let (log_bytes, checkpoint_sequence) = match self.writer.lock() {
            Ok(w) => (
                w.log_bytes,
                w.manifest.as_ref().map_or(0, |m| m.checkpoint_sequence()),
            ),
            Err(_) => (0, 0),
        };

        StorageStats {
            sequence: self.current_sequence(),
            checkpoint_sequence,
            live_entries,
            versions,
            memtable_bytes,
            log_bytes,
            batches_written: self.batches_written.load(Ordering::Relaxed),
            checkpoints_written: self.checkpoints_written.load(Ordering::Relaxed),
            pinned_snapshots: self.snapshots.len(),
        }
    }

    /// Remove the store's files. A missing directory is not an error.
    pub fn destroy(path: impl AsRef<Path>, _options: &Options) -> Result<()> {
        let dir = path.as_ref();
        if !dir.exists() {
            return Ok(());
        }

        remove_file_if_exists(&dir.join(MANIFEST_FILE))?;
        manifest::remove_temp(dir)?;
        for sub in [WAL_DIR, TABLE_DIR] {
            match fs::remove_dir_all(dir.join(sub)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        // Leaves the directory in place if it holds anything else
        let _ = fs::remove_dir(dir);

        info!(path = ?dir, "Destroyed store");
        Ok(())
    }

    /// Rebuild a store from whatever can still be read.
    ///
    /// The newest readable checkpoint table and every intact log record after
    /// it are merged into a fresh checkpoint; damaged blocks and records are
    /// skipped. The old logs and tables are then removed.
    pub fn repair(path: impl AsRef<Path>, options: &Options) -> Result<RepairReport> {
        let dir = path.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("{}: does not exist", dir.display())));
        }
        fs::create_dir_all(dir.join(WAL_DIR))?;
        fs::create_dir_all(dir.join(TABLE_DIR))?;

        let mut report = RepairReport::default();
        let mut memtable = Memtable::new();
        let mut base_sequence = 0;

        for (sequence, path) in list_tables(&dir)?.into_iter().rev() {
            let salvaged = TableReader::open(&path).and_then(|mut r| r.salvage());
            match salvaged {
                Ok((entries, damaged)) => {
                    report.table_entries = entries.len();
                    report.damaged_blocks = damaged;
                    for entry in entries {
                        memtable.insert(entry.key, sequence, MemtableEntry::Value(entry.value));
                    }
                    base_sequence = sequence;
                    break;
                }
                Err(e) if e.is_corruption() => {
                    warn!(table = ?path, error = %e, "Skipping unreadable checkpoint table");
                    report.tables_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let wal = WalManager::new(WalConfig {
            wal_dir: dir.join(WAL_DIR),
            max_segment_size: options.max_log_segment_size,
            paranoid_checks: false,
        })?;
        let salvaged = wal.salvage()?;
        report.damaged_segments = salvaged.stats.damaged_segments;

        let mut sequence = base_sequence;
        for record in salvaged.records {
            if record.sequence > base_sequence {
                memtable.apply(record.sequence, &record.ops);
                sequence = sequence.max(record.sequence);
                report.log_records += 1;
            }
        }
        report.sequence = sequence;

        let final_path = dir.join(TABLE_DIR).join(table::table_file_name(sequence));
        let temp_path = final_path.with_extension("tmp");
        let mut writer = TableWriter::create(&temp_path, options.block_size, sequence)?;
        for (key, value) in memtable.visible(sequence) {
            writer.add(key, value)?;
        }
        let mut meta = writer.finish()?;
        fs::rename(&temp_path, &final_path)?;
        meta.path = final_path;

        Manifest::unsaved(&dir).record_checkpoint(&meta)?;
        wal.segment_manager().cleanup_all()?;
        remove_stale_tables(&dir, meta.path.file_name().and_then(|n| n.to_str()))?;

        if report.tables_skipped + report.damaged_blocks + report.damaged_segments > 0 {
            warn!(path = ?dir, ?report, "Repaired store with data loss");
        } else {
            info!(path = ?dir, ?report, "Repaired store");
        }

        Ok(report)
    }
}

impl Engine for StorageEngine {
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let sequence = options
            .snapshot
            .map(SnapshotId::sequence)
            .unwrap_or_else(|| self.current_sequence());

        let memtable = self.memtable.read().map_err(|_| Error::LockPoisoned)?;
        Ok(memtable.get(key, sequence).flatten().map(<[u8]>::to_vec))
    }

    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        let mut state = self.writer.lock().map_err(|_| Error::LockPoisoned)?;
        self.ensure_open()?;

        if batch.is_empty() {
            return Ok(());
        }

        let sequence = self.current_sequence() + 1;
        let written = match state.wal.as_mut() {
            Some(wal) => wal.append(&WalRecord::batch(sequence, batch), options.sync)?,
            None => batch.approximate_size() as u64,
        };

        self.memtable
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .apply(sequence, batch.operations());
        self.sequence.store(sequence, Ordering::Release);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        state.log_bytes += written;

        debug!(sequence, ops = batch.len(), bytes = written, sync = options.sync, "Committed batch");

        if state.log_bytes >= self.options.write_buffer_size as u64 {
            // The batch is already durable; a failed checkpoint is retried on
            // the next write.
            if let Err(e) = self.checkpoint(&mut state) {
                warn!(error = %e, "Checkpoint failed");
            }
        }

        Ok(())
    }

    fn iter(&self, options: &ReadOptions) -> Result<Box<dyn EngineIterator>> {
        self.ensure_open()?;
        let sequence = match options.snapshot {
            Some(snapshot) => self.snapshots.acquire(snapshot.sequence())?,
            None => self.snapshots.acquire_with(|| self.current_sequence())?,
        };
        debug!(sequence, "Created iterator");

        Ok(Box::new(StorageIterator::new(
            Arc::clone(&self.memtable),
            Arc::clone(&self.snapshots),
            sequence,
        )))
    }

    fn snapshot(&self) -> Result<SnapshotId> {
        self.ensure_open()?;
        let sequence = self.snapshots.acquire_with(|| self.current_sequence())?;
        Ok(SnapshotId::new(sequence))
    }

    fn release_snapshot(&self, snapshot: SnapshotId) {
        self.snapshots.release(snapshot.sequence());
    }

    fn property(&self, name: &str) -> Option<String> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match name {
            properties::NUM_ENTRIES => Some(self.stats().live_entries.to_string()),
            properties::SEQUENCE => Some(self.current_sequence().to_string()),
            properties::STATS => Some(self.stats().to_string()),
            properties::LOG_BYTES => Some(self.stats().log_bytes.to_string()),
            _ => None,
        }
    }

    fn approximate_sizes(&self, ranges: &[KeyRange]) -> Result<Vec<u64>> {
        self.ensure_open()?;
        let memtable = self.memtable.read().map_err(|_| Error::LockPoisoned)?;
        Ok(ranges
            .iter()
            .map(|range| memtable.approximate_size(&range.start, &range.limit))
            .collect())
    }

    fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        let mut state = self.writer.lock().map_err(|_| Error::LockPoisoned)?;
        self.ensure_open()?;
        debug!(?start, ?limit, "Compacting range");
        // A checkpoint always covers the whole key space
        self.checkpoint(&mut state)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.writer.lock().map_err(|_| Error::LockPoisoned)?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(wal) = state.wal.as_mut() {
            wal.close()?;
        }
        info!(path = ?self.dir, sequence = self.current_sequence(), "Closed store");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Last committed sequence
    pub sequence: u64,
    /// Sequence covered by the current checkpoint table
    pub checkpoint_sequence: u64,
    /// Live keys at the current sequence
    pub live_entries: usize,
    /// Versions held in the memtable
    pub versions: usize,
    /// Approximate memtable size
    pub memtable_bytes: usize,
    /// Bytes committed since the last checkpoint
    pub log_bytes: u64,
    /// Batches committed since open
    pub batches_written: u64,
    /// Checkpoints written since open
    pub checkpoints_written: u64,
    /// Distinct pinned sequences (snapshots and iterators)
    pub pinned_snapshots: usize,
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sequence: {}", self.sequence)?;
        writeln!(f, "checkpoint-sequence: {}", self.checkpoint_sequence)?;
        writeln!(f, "entries: {}", self.live_entries)?;
        writeln!(f, "versions: {}", self.versions)?;
        writeln!(f, "memtable-bytes: {}", self.memtable_bytes)?;
        writeln!(f, "log-bytes: {}", self.log_bytes)?;
        writeln!(f, "batches-written: {}", self.batches_written)?;
        writeln!(f, "checkpoints-written: {}", self.checkpoints_written)?;
        write!(f, "pinned-snapshots: {}", self.pinned_snapshots)
    }
}

/// What [`StorageEngine::repair`] recovered and dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Sequence of the rebuilt checkpoint
    pub sequence: u64,
    /// Entries taken from the newest readable table
    pub table_entries: usize,
    /// Unreadable tables that were skipped
    pub tables_skipped: usize,
    /// Damaged blocks skipped in the table that was used
    pub damaged_blocks: usize,
    /// Log records replayed on top of the table
    pub log_records: usize,
    /// Log segments with damaged tails
    pub damaged_segments: usize,
}

/// Checkpoint tables under `dir`, oldest first
fn list_tables(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut tables: Vec<(u64, PathBuf)> = fs::read_dir(dir.join(TABLE_DIR))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let sequence = table::parse_table_name(entry.file_name().to_str()?)?;
            Some((sequence, entry.path()))
        })
        .collect();
    tables.sort();
    Ok(tables)
}

/// Delete every table file (and leftover temporary) except `keep`
fn remove_stale_tables(dir: &Path, keep: Option<&str>) -> Result<()> {
    for entry in fs::read_dir(dir.join(TABLE_DIR))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_table = name.ends_with(".tbl") || name.ends_with(".tmp");
        if is_table && Some(name.as_ref()) != keep {
            debug!(table = %name, "Removing stale table");
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create() -> Options {
        Options::default().with_create_if_missing(true)
    }

    fn put(engine: &StorageEngine, key: &str, value: &str) {
        let mut batch = WriteBatch::new();
        batch.put(key.as_bytes(), value.as_bytes());
        engine.write(&WriteOptions::default(), &batch).unwrap();
    }

    fn get(engine: &StorageEngine, key: &str) -> Option<Vec<u8>> {
        engine.get(&ReadOptions::default(), key.as_bytes()).unwrap()
    }

    #[test]
    fn test_storage_engine_basic() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path(), &create()).unwrap();

        put(&engine, "key1", "value1");
        put(&engine, "key2", "value2");

        assert_eq!(get(&engine, "key1"), Some(b"value1".to_vec()));
        assert_eq!(get(&engine, "key2"), Some(b"value2".to_vec()));
        assert_eq!(get(&engine, "key3"), None);
        assert_eq!(engine.property(properties::SEQUENCE), Some("2".to_string()));
    }

    #[test]
    fn test_batch_is_atomic_and_ordered() {
        let engine = StorageEngine::in_memory();

        let mut batch = WriteBatch::new();
        batch.put(b"k", b"first").delete(b"k").put(b"k", b"last").put(b"j", b"x");
        engine.write(&WriteOptions::default(), &batch).unwrap();

        assert_eq!(get(&engine, "k"), Some(b"last".to_vec()));
        assert_eq!(engine.property(properties::SEQUENCE), Some("1".to_string()));
        assert_eq!(engine.property(properties::NUM_ENTRIES), Some("2".to_string()));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        let err = StorageEngine::open(&path, &Options::default()).err().unwrap();
        assert!(err.is_not_found());
        assert!(!path.exists());

        StorageEngine::open(&path, &create()).unwrap();
        let err = StorageEngine::open(&path, &create().with_error_if_exists(true))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_storage_engine_recovery() {
        let dir = tempdir().unwrap();

        {
            let engine = StorageEngine::open(dir.path(), &create()).unwrap();
            put(&engine, "persistent", "data");
            put(&engine, "other", "x");
            let mut batch = WriteBatch::new();
            batch.delete(b"other");
            engine.write(&WriteOptions::default().with_sync(true), &batch).unwrap();
            // Don't call close - simulate crash
        }

        let engine = StorageEngine::open(dir.path(), &Options::default()).unwrap();
        assert_eq!(get(&engine, "persistent"), Some(b"data".to_vec()));
        assert_eq!(get(&engine, "other"), None);
        assert_eq!(engine.property(properties::SEQUENCE), Some("3".to_string()));
    }

    #[test]
    fn test_checkpoint_retires_log_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let options = create().with_write_buffer_size(256).with_block_size(128);

        {
            let engine = StorageEngine::open(dir.path(), &options).unwrap();
            for i in 0..50 {
                put(&engine, &format!("key{:03}", i), &format!("value{}", i));
            }
            let stats = engine.stats();
            assert!(stats.checkpoints_written > 0);
            assert!(stats.checkpoint_sequence > 0);
            engine.close().unwrap();
        }

        let tables = list_tables(dir.path()).unwrap();
        assert_eq!(tables.len(), 1);

        let engine = StorageEngine::open(dir.path(), &options).unwrap();
        for i in 0..50 {
            assert_eq!(
                get(&engine, &format!("key{:03}", i)),
                Some(format!("value{}", i).into_bytes())
            );
        }
        assert_eq!(engine.property(properties::SEQUENCE), Some("50".to_string()));
    }

    #[test]
    fn test_snapshot_survives_pruning() {
        let engine = StorageEngine::in_memory();
        put(&engine, "k", "old");
        let snapshot = engine.snapshot().unwrap();

        put(&engine, "k", "new");
        engine.compact_range(None, None).unwrap();

        let at_snapshot = ReadOptions::default().with_snapshot(snapshot);
        assert_eq!(
            engine.get(&at_snapshot, b"k").unwrap(),
            Some(b"old".to_vec())
        );
        assert_eq!(get(&engine, "k"), Some(b"new".to_vec()));

        engine.release_snapshot(snapshot);
        engine.compact_range(None, None).unwrap();
        assert_eq!(engine.stats().versions, 1);
    }

    #[test]
    fn test_iterator_is_isolated_from_later_writes() {
        let engine = StorageEngine::in_memory();
        put(&engine, "a", "1");
        put(&engine, "b", "2");

        let mut it = engine.iter(&ReadOptions::default()).unwrap();
        put(&engine, "c", "3");
        let mut batch = WriteBatch::new();
        batch.delete(b"a");
        engine.write(&WriteOptions::default(), &batch).unwrap();
        engine.compact_range(None, None).unwrap();

        let mut keys = Vec::new();
        it.seek_to_first();
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(engine.stats().pinned_snapshots, 1);
        drop(it);
        assert_eq!(engine.stats().pinned_snapshots, 0);
    }

    #[test]
    fn test_closed_engine_rejects_calls() {
        let engine = StorageEngine::in_memory();
        engine.close().unwrap();
        engine.close().unwrap();

        assert!(matches!(
            engine.get(&ReadOptions::default(), b"k"),
            Err(Error::HandleClosed)
        ));
        assert!(matches!(
            engine.write(&WriteOptions::default(), &WriteBatch::new()),
            Err(Error::HandleClosed)
        ));
        assert!(engine.iter(&ReadOptions::default()).is_err());
        assert!(engine.property(properties::SEQUENCE).is_none());
    }

    #[test]
    fn test_properties_and_sizes() {
        let engine = StorageEngine::in_memory();
        put(&engine, "a", "aaaaaaaaaa");
        put(&engine, "m", "m");

        let stats = engine.property(properties::STATS).unwrap();
        assert!(stats.contains("entries: 2"));
        assert!(engine.property("rustlevel.unknown").is_none());

        let sizes = engine
            .approximate_sizes(&[KeyRange::new("a", "b"), KeyRange::new("n", "z")])
            .unwrap();
        assert!(sizes[0] > 0);
        assert_eq!(sizes[1], 0);
    }

    #[test]
    fn test_paranoid_open_detects_torn_log() {
        let dir = tempdir().unwrap();
        {
            let engine = StorageEngine::open(dir.path(), &create()).unwrap();
            put(&engine, "k", "v");
        }
        let segment = rustlevel_wal::SegmentManager::new(dir.path().join(WAL_DIR))
            .latest_segment()
            .unwrap()
            .unwrap();
        let mut bytes = fs::read(&segment.path).unwrap();
        bytes.extend_from_slice(&[9, 0, 0, 0, 1]);
        fs::write(&segment.path, &bytes).unwrap();

        let paranoid = Options::default().with_paranoid_checks(true);
        assert!(StorageEngine::open(dir.path(), &paranoid)
            .err()
            .unwrap()
            .is_corruption());

        let engine = StorageEngine::open(dir.path(), &Options::default()).unwrap();
        assert_eq!(get(&engine, "k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_destroy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let engine = StorageEngine::open(&path, &create()).unwrap();
            put(&engine, "k", "v");
            engine.close().unwrap();
        }

        StorageEngine::destroy(&path, &Options::default()).unwrap();
        assert!(!path.exists());
        StorageEngine::destroy(&path, &Options::default()).unwrap();
        assert!(StorageEngine::open(&path, &Options::default()).is_err());
    }

    #[test]
    fn test_repair_rebuilds_from_log_when_table_is_damaged() {
        let dir = tempdir().unwrap();
        let options = create().with_write_buffer_size(1 << 20);
        {
            let engine = StorageEngine::open(dir.path(), &options).unwrap();
            put(&engine, "a", "1");
            engine.compact_range(None, None).unwrap();
            put(&engine, "b", "2");
            engine.close().unwrap();
        }

        // Destroy the checkpoint table's footer
        let (_, table) = list_tables(dir.path()).unwrap().remove(0);
        let len = fs::metadata(&table).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(&table)
            .unwrap()
            .set_len(len / 2)
            .unwrap();
        assert!(StorageEngine::open(dir.path(), &options).is_err());

        let report = StorageEngine::repair(dir.path(), &options).unwrap();
        assert_eq!(report.tables_skipped, 1);
        assert_eq!(report.log_records, 1);

        let engine = StorageEngine::open(dir.path(), &options).unwrap();
        assert_eq!(get(&engine, "a"), None);
        assert_eq!(get(&engine, "b"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_repair_of_healthy_store_keeps_everything() {
        let dir = tempdir().unwrap();
        {
            let engine = StorageEngine::open(dir.path(), &create()).unwrap();
            for i in 0..10 {
                put(&engine, &format!("k{}", i), "v");
            }
        }

        let report = StorageEngine::repair(dir.path(), &Options::default()).unwrap();
        assert_eq!(report.sequence, 10);
        assert_eq!(report.log_records, 10);

        let engine = StorageEngine::open(dir.path(), &Options::default()).unwrap();
        assert_eq!(engine.property(properties::NUM_ENTRIES), Some("10".to_string()));
        assert_eq!(engine.stats().checkpoint_sequence, 10);
    }
}
