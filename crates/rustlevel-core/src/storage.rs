//! Storage engine contract.
//!
//! The client layer never touches persistence directly. It talks to an
//! [`Engine`], which owns durability, atomicity and ordering, and walks the key
//! space through an [`EngineIterator`]. Keys are ordered by unsigned
//! lexicographic byte comparison.

use crate::batch::WriteBatch;
use crate::options::{ReadOptions, WriteOptions};
use crate::Result;

/// Identifies a point-in-time read view held by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// Wraps an engine sequence number
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The sequence number this snapshot reads at
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// A key range for size estimation: `start` inclusive, `limit` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// First key of the range
    pub start: Vec<u8>,
    /// Key just past the range
    pub limit: Vec<u8>,
}

impl KeyRange {
    /// Creates a range from anything byte-like
    pub fn new(start: impl AsRef<[u8]>, limit: impl AsRef<[u8]>) -> Self {
        Self {
            start: start.as_ref().to_vec(),
            limit: limit.as_ref().to_vec(),
        }
    }

    /// Returns true if `key` falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.limit.as_slice()
    }
}

/// An ordered, durable key-value engine.
///
/// Implementations must be thread-safe. Every method may block on I/O.
pub trait Engine: Send + Sync {
    /// Point lookup. `Ok(None)` means the key is absent.
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Applies every operation of `batch` atomically, in order.
    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()>;

    /// Creates an unpositioned iterator over the engine's key order.
    fn iter(&self, options: &ReadOptions) -> Result<Box<dyn EngineIterator>>;

    /// Pins the current state as a read view.
    fn snapshot(&self) -> Result<SnapshotId>;

    /// Releases a read view obtained from [`Engine::snapshot`].
    fn release_snapshot(&self, snapshot: SnapshotId);

    /// Engine-specific property lookup.
    fn property(&self, name: &str) -> Option<String>;

    /// Estimated stored bytes for each range.
    fn approximate_sizes(&self, ranges: &[KeyRange]) -> Result<Vec<u64>>;

    /// Compacts the given key range (`None` means unbounded on that side).
    fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()>;

    /// Flushes and releases engine resources. Later calls fail.
    fn close(&self) -> Result<()>;
}

/// A positioned walk over an engine's key order.
///
/// A freshly created iterator is not valid. `key` and `value` may only be
/// called while [`EngineIterator::valid`] returns true. Errors encountered
/// while moving are reported through [`EngineIterator::status`].
pub trait EngineIterator: Send {
    /// True if positioned at an entry
    fn valid(&self) -> bool;

    /// Position at the smallest key
    fn seek_to_first(&mut self);

    /// Position at the largest key
    fn seek_to_last(&mut self);

    /// Position at the smallest key >= `target`
    fn seek(&mut self, target: &[u8]);

    /// Move to the next larger key
    fn next(&mut self);

    /// Move to the next smaller key
    fn prev(&mut self);

    /// Current key
    fn key(&self) -> &[u8];

    /// Current value
    fn value(&self) -> &[u8];

    /// Error state from the last movement
    fn status(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::new("b", "d");
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c"));
        assert!(!range.contains(b"d"));
    }

    #[test]
    fn test_snapshot_id_ordering() {
        assert!(SnapshotId::new(1) < SnapshotId::new(2));
        assert_eq!(SnapshotId::new(9).sequence(), 9);
    }
}
