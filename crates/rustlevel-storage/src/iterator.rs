//! Engine iterator over a pinned sequence number

use crate::memtable::Memtable;
use crate::snapshot::SnapshotList;
use rustlevel_core::{EngineIterator, Error, Result};
use std::sync::{Arc, RwLock};

enum Move<'a> {
    First,
    Last,
    Seek(&'a [u8]),
    Next(&'a [u8]),
    Prev(&'a [u8]),
}

/// Iterator that reads the memtable as of one sequence number.
///
/// The sequence is pinned in the snapshot registry for the iterator's whole
/// life, so writes and pruning that happen meanwhile never change what it
/// returns. Each step re-reads the memtable under a short read lock.
pub struct StorageIterator {
    memtable: Arc<RwLock<Memtable>>,
    snapshots: Arc<SnapshotList>,
    sequence: u64,
    current: Option<(Vec<u8>, Vec<u8>)>,
    poisoned: bool,
}

impl StorageIterator {
    /// Create an iterator over an already pinned `sequence`; the pin is
    /// released on drop.
    pub(crate) fn new(
        memtable: Arc<RwLock<Memtable>>,
        snapshots: Arc<SnapshotList>,
        sequence: u64,
    ) -> Self {
        Self {
            memtable,
            snapshots,
            sequence,
            current: None,
            poisoned: false,
        }
    }

    /// The sequence number this iterator reads at
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn reposition(&mut self, step: Move<'_>) {
        let memtable = match self.memtable.read() {
            Ok(guard) => guard,
            Err(_) => {
                self.poisoned = true;
                self.current = None;
                return;
            }
        };

        let found = match step {
            Move::First => memtable.seek(&[], self.sequence),
            Move::Last => memtable.prev_before(None, self.sequence),
            Move::Seek(target) => memtable.seek(target, self.sequence),
            Move::Next(after) => memtable.next_after(after, self.sequence),
            Move::Prev(before) => memtable.prev_before(Some(before), self.sequence),
        };

        self.poisoned = false;
        self.current = found.map(|(k, v)| (k.to_vec(), v.to_vec()));
    }
}

impl EngineIterator for StorageIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.reposition(Move::First);
    }

    fn seek_to_last(&mut self) {
        self.reposition(Move::Last);
    }

    fn seek(&mut self, target: &[u8]) {
        self.reposition(Move::Seek(target));
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.reposition(Move::Next(&key));
        }
    }

    fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.reposition(Move::Prev(&key));
        }
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or_default()
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or_default()
    }

    fn status(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::LockPoisoned);
        }
        Ok(())
    }
}

impl Drop for StorageIterator {
    fn drop(&mut self) {
        self.snapshots.release(self.sequence);
    }
}
