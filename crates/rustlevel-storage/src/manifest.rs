//! Manifest - durable record of which checkpoint table is current
//!
//! The manifest is a single small file holding the sequence number of the
//! latest checkpoint and the table that stores it. It is rewritten whole: the
//! new contents go to a temporary file which is synced and then renamed over
//! `MANIFEST`, so readers see either the old or the new state.

use crate::table::TableMeta;
use rustlevel_core::format_version::{magic, manifest_version, MANIFEST_FORMAT_VERSION};
use rustlevel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Manifest file name
pub const MANIFEST_FILE: &str = "MANIFEST";
/// Temporary name used while replacing the manifest
const MANIFEST_TEMP: &str = "MANIFEST.tmp";

/// Persisted manifest contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestState {
    magic: u32,
    version: u16,
    /// Every batch at or below this sequence is in the checkpoint table
    pub checkpoint_sequence: u64,
    /// File name of the checkpoint table under `tables/`
    pub table: Option<String>,
    /// Entries in the checkpoint table
    pub table_entries: u64,
    /// Checkpoints written over the store's lifetime
    pub checkpoints: u64,
}

impl Default for ManifestState {
    fn default() -> Self {
        Self {
            magic: magic::MANIFEST,
            version: MANIFEST_FORMAT_VERSION,
            checkpoint_sequence: 0,
            table: None,
            table_entries: 0,
            checkpoints: 0,
        }
    }
}

/// Manifest manager - tracks the current checkpoint
#[derive(Debug)]
pub struct Manifest {
    dir: PathBuf,
    state: ManifestState,
}

impl Manifest {
    /// Returns true if `dir` holds a manifest
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        dir.as_ref().join(MANIFEST_FILE).is_file()
    }

    /// Write a fresh manifest for an empty store
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let manifest = Self::unsaved(dir);
        manifest.persist()?;
        Ok(manifest)
    }

    /// An empty manifest that has not been written yet
    pub(crate) fn unsaved(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            state: ManifestState::default(),
        }
    }

    /// Load and validate an existing manifest
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let contents = fs::read(dir.join(MANIFEST_FILE))?;

        if contents.len() < 4 {
            return Err(Error::Corruption("MANIFEST too small".into()));
        }
        let (body, crc_bytes) = contents.split_at(contents.len() - 4);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored_crc {
            return Err(Error::Corruption("MANIFEST CRC mismatch".into()));
        }

        let state: ManifestState = bincode::deserialize(body)
            .map_err(|e| Error::Corruption(format!("Unreadable MANIFEST: {}", e)))?;

        if state.magic != magic::MANIFEST {
            return Err(Error::Corruption("Invalid MANIFEST magic".into()));
        }
        if !manifest_version().can_read(state.version) {
            return Err(Error::Corruption(format!(
                "Unsupported MANIFEST version {}",
                state.version
            )));
        }

        Ok(Self { dir, state })
    }

    /// Atomically replace the on-disk manifest with the in-memory state
    fn persist(&self) -> Result<()> {
        let mut encoded =
            bincode::serialize(&self.state).map_err(|e| Error::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&encoded);
        encoded.extend_from_slice(&crc.to_le_bytes());

        let temp_path = self.dir.join(MANIFEST_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.dir.join(MANIFEST_FILE))?;

        // Make the rename itself durable where the platform allows it
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }

    /// Record a new checkpoint table as current
    pub fn record_checkpoint(&mut self, table: &TableMeta) -> Result<()> {
        let name = table
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidArgument(format!("bad table path {:?}", table.path)))?;

        let mut next = self.state.clone();
        next.checkpoint_sequence = table.sequence;
        next.table = Some(name.to_string());
        next.table_entries = table.entry_count;
        next.checkpoints += 1;

        let previous = std::mem::replace(&mut self.state, next);
        if let Err(e) = self.persist() {
            self.state = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Sequence covered by the current checkpoint
    pub fn checkpoint_sequence(&self) -> u64 {
        self.state.checkpoint_sequence
    }

    /// File name of the current checkpoint table, if any
    pub fn table(&self) -> Option<&str> {
        self.state.table.as_deref()
    }

    /// The full persisted state
    pub fn state(&self) -> &ManifestState {
        &self.state
    }
}

/// Remove a leftover temporary manifest, if any
pub(crate) fn remove_temp(dir: &Path) -> Result<()> {
    match fs::remove_file(dir.join(MANIFEST_TEMP)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
