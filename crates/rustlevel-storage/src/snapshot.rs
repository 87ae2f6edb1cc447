//! Live snapshot registry
//!
//! Snapshots are sequence numbers. The registry counts how many readers
//! (explicit snapshots and open iterators) hold each sequence so that pruning
//! never drops a version one of them can still see.

use rustlevel_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Reference-counted set of pinned sequence numbers
#[derive(Debug, Default)]
pub struct SnapshotList {
    pinned: Mutex<BTreeMap<u64, usize>>,
}

impl SnapshotList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the sequence returned by `current`.
    ///
    /// `current` runs under the registry lock, so a concurrent prune either
    /// sees this pin or runs before the sequence is read.
    pub fn acquire_with(&self, current: impl FnOnce() -> u64) -> Result<u64> {
        let mut pinned = self.pinned.lock().map_err(|_| Error::LockPoisoned)?;
        let sequence = current();
        *pinned.entry(sequence).or_insert(0) += 1;
        Ok(sequence)
    }

    /// Pin a known sequence
    pub fn acquire(&self, sequence: u64) -> Result<u64> {
        self.acquire_with(|| sequence)
    }

    /// Drop one pin on `sequence`. Unknown sequences are ignored.
    pub fn release(&self, sequence: u64) {
        let mut pinned = match self.pinned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(count) = pinned.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(&sequence);
            }
        }
    }

    /// Run `f` with the oldest pinned sequence (or `None`) while holding the
    /// registry lock, so no new pin can appear below it meanwhile.
    pub fn with_oldest<T>(&self, f: impl FnOnce(Option<u64>) -> T) -> Result<T> {
        let pinned = self.pinned.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(f(pinned.keys().next().copied()))
    }

    /// Number of distinct pinned sequences
    pub fn len(&self) -> usize {
        self.pinned.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Returns true if nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
