//! Memtable - In-memory versioned sorted map
//!
//! The Memtable holds every version of every key that a live reader may still
//! need. Entries are ordered by user key ascending and then by sequence number
//! descending, so the newest version of a key comes first. A reader at
//! sequence `s` sees, for each key, the newest version with sequence `<= s`;
//! a tombstone hides the key.

use rustlevel_core::Operation;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Entry value in the memtable - can be a value or a tombstone (deletion marker)
#[derive(Debug, Clone, PartialEq)]
pub enum MemtableEntry {
    /// A live value
    Value(Vec<u8>),
    /// A tombstone marking deletion
    Tombstone,
}

impl MemtableEntry {
    /// Returns the size of this entry in bytes
    pub fn size(&self) -> usize {
        match self {
            MemtableEntry::Value(v) => v.len() + 1, // +1 for type tag
            MemtableEntry::Tombstone => 1,
        }
    }
}

/// A user key tagged with the sequence that wrote it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey {
    key: Vec<u8>,
    sequence: Reverse<u64>,
}

impl VersionKey {
    fn new(key: Vec<u8>, sequence: u64) -> Self {
        Self {
            key,
            sequence: Reverse(sequence),
        }
    }

    /// The user key
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The sequence that wrote this version
    pub fn sequence(&self) -> u64 {
        self.sequence.0
    }

    fn size(&self) -> usize {
        self.key.len() + 8
    }
}

/// Versioned in-memory table
#[derive(Debug, Default)]
pub struct Memtable {
    data: BTreeMap<VersionKey, MemtableEntry>,
    /// Approximate size in bytes
    size_bytes: usize,
}

impl Memtable {
    /// Creates a new empty Memtable
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch's operations at `sequence`. Within one batch the last
    /// operation on a key wins.
    pub fn apply(&mut self, sequence: u64, ops: &[Operation]) {
        for op in ops {
            match op {
                Operation::Put { key, value } => {
                    self.insert(key.clone(), sequence, MemtableEntry::Value(value.clone()))
                }
                Operation::Delete { key } => {
                    self.insert(key.clone(), sequence, MemtableEntry::Tombstone)
                }
            }
        }
    }

    /// Inserts a single version
    pub fn insert(&mut self, key: Vec<u8>, sequence: u64, entry: MemtableEntry) {
        let version = VersionKey::new(key, sequence);
        let added = version.size() + entry.size();
        if let Some(old) = self.data.insert(version.clone(), entry) {
            self.size_bytes -= version.size() + old.size();
        }
        self.size_bytes += added;
    }

    /// Looks up the version of `key` visible at `sequence`
    ///
    /// Returns:
    /// - `Some(Some(value))` if the key holds a value
    /// - `Some(None)` if the visible version is a tombstone
    /// - `None` if no version is visible
    pub fn get(&self, key: &[u8], sequence: u64) -> Option<Option<&[u8]>> {
        let start = VersionKey::new(key.to_vec(), sequence);
        self.data
            .range(start..)
            .next()
            .filter(|(version, _)| version.key == key)
            .map(|(_, entry)| match entry {
                MemtableEntry::Value(v) => Some(v.as_slice()),
                MemtableEntry::Tombstone => None,
            })
    }

    /// Smallest visible key `>= target`
    pub fn seek(&self, target: &[u8], sequence: u64) -> Option<(&[u8], &[u8])> {
        let start = VersionKey::new(target.to_vec(), u64::MAX);
        first_visible(self.data.range(start..), sequence)
    }

    /// Smallest visible key `> after`
    pub fn next_after(&self, after: &[u8], sequence: u64) -> Option<(&[u8], &[u8])> {
        // Sequence 0 sorts last among a key's versions
        let start = VersionKey::new(after.to_vec(), 0);
        first_visible(
            self.data.range((Bound::Excluded(start), Bound::Unbounded)),
            sequence,
        )
    }

    /// Largest visible key `< before`, or the largest visible key overall
    pub fn prev_before(&self, before: Option<&[u8]>, sequence: u64) -> Option<(&[u8], &[u8])> {
        let upper = match before {
            Some(key) => Bound::Excluded(VersionKey::new(key.to_vec(), u64::MAX)),
            None => Bound::Unbounded,
        };

        // Walking backwards, a key's versions arrive oldest first; the last one
        // seen at or below `sequence` is the visible one.
        let mut group: Option<(&[u8], &MemtableEntry)> = None;
        for (version, entry) in self.data.range((Bound::Unbounded, upper)).rev() {
            if version.sequence() > sequence {
                continue;
            }
            if let Some((key, MemtableEntry::Value(v))) = group {
                if key != version.key() {
                    return Some((key, v));
                }
            }
            group = Some((version.key(), entry));
        }

        match group {
            Some((key, MemtableEntry::Value(v))) => Some((key, v)),
            _ => None,
        }
    }

    /// All key/value pairs visible at `sequence`, in key order
    pub fn visible(&self, sequence: u64) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        let mut decided: Option<&[u8]> = None;
        self.data.iter().filter_map(move |(version, entry)| {
            if version.sequence() > sequence || decided == Some(version.key()) {
                return None;
            }
            decided = Some(version.key());
            match entry {
                MemtableEntry::Value(v) => Some((version.key(), v.as_slice())),
                MemtableEntry::Tombstone => None,
            }
        })
    }

    /// Drops versions that no reader at or above `oldest` can see.
    ///
    /// Returns the number of versions removed.
    pub fn prune(&mut self, oldest: u64) -> usize {
        let mut doomed = Vec::new();
        let mut current: Option<&[u8]> = None;
        let mut boundary_seen = false;

        for (version, entry) in &self.data {
            if current != Some(version.key()) {
                current = Some(version.key());
                boundary_seen = false;
            }
            if version.sequence() > oldest {
                continue;
            }
            if boundary_seen || matches!(entry, MemtableEntry::Tombstone) {
                doomed.push(version.clone());
            }
            boundary_seen = true;
        }

        for version in &doomed {
            if let Some(entry) = self.data.remove(version) {
                self.size_bytes -= version.size() + entry.size();
            }
        }

        doomed.len()
    }

    /// Approximate bytes held for keys in `[start, limit)`
    pub fn approximate_size(&self, start: &[u8], limit: &[u8]) -> u64 {
        if start >= limit {
            return 0;
        }
        let lower = VersionKey::new(start.to_vec(), u64::MAX);
        let upper = VersionKey::new(limit.to_vec(), u64::MAX);
        self.data
            .range(lower..upper)
            .map(|(version, entry)| (version.size() + entry.size()) as u64)
            .sum()
    }

    /// Returns the approximate size of the memtable in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Returns the number of stored versions
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the memtable holds no versions
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// First key whose visible version at `sequence` is a value
fn first_visible<'a>(
    versions: impl Iterator<Item = (&'a VersionKey, &'a MemtableEntry)>,
    sequence: u64,
) -> Option<(&'a [u8], &'a [u8])> {
    let mut decided: Option<&[u8]> = None;
    for (version, entry) in versions {
        if version.sequence() > sequence || decided == Some(version.key()) {
            continue;
        }
        decided = Some(version.key());
        if let MemtableEntry::Value(v) = entry {
            return Some((version.key(), v));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> Operation {
        Operation::Put {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    fn del(key: &str) -> Operation {
        Operation::Delete {
            key: key.as_bytes().to_vec(),
        }
    }

    fn keys(mt: &Memtable, sequence: u64) -> Vec<String> {
        mt.visible(sequence)
            .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
            .collect()
    }

    #[test]
    fn test_memtable_new() {
        let mt = Memtable::new();
        assert!(mt.is_empty());
        assert_eq!(mt.len(), 0);
        assert_eq!(mt.size_bytes(), 0);
    }

    #[test]
    fn test_get_respects_sequence() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("key", "v1")]);
        mt.apply(2, &[put("key", "v2")]);
        mt.apply(3, &[del("key")]);

        assert_eq!(mt.get(b"key", 0), None);
        assert_eq!(mt.get(b"key", 1), Some(Some(b"v1".as_slice())));
        assert_eq!(mt.get(b"key", 2), Some(Some(b"v2".as_slice())));
        assert_eq!(mt.get(b"key", 3), Some(None));
        assert_eq!(mt.get(b"other", 3), None);
    }

    #[test]
    fn test_last_op_in_batch_wins() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("k", "a"), del("k"), put("k", "b")]);
        assert_eq!(mt.get(b"k", 1), Some(Some(b"b".as_slice())));
        assert_eq!(mt.len(), 1);

        mt.apply(2, &[put("j", "x"), del("j")]);
        assert_eq!(mt.get(b"j", 2), Some(None));
    }

    #[test]
    fn test_seek_and_step_skip_hidden_keys() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("a", "1"), put("b", "2"), put("c", "3"), put("d", "4")]);
        mt.apply(2, &[del("b"), put("e", "5")]);

        assert_eq!(mt.seek(b"b", 2), Some((&b"c"[..], &b"3"[..])));
        assert_eq!(mt.seek(b"b", 1), Some((&b"b"[..], &b"2"[..])));
        assert_eq!(mt.next_after(b"a", 2), Some((&b"c"[..], &b"3"[..])));
        assert_eq!(mt.prev_before(Some(b"c"), 2), Some((&b"a"[..], &b"1"[..])));
        assert_eq!(mt.prev_before(None, 1), Some((&b"d"[..], &b"4"[..])));
        assert_eq!(mt.prev_before(None, 2), Some((&b"e"[..], &b"5"[..])));
        assert_eq!(mt.prev_before(Some(b"a"), 2), None);
        assert_eq!(mt.next_after(b"e", 2), None);
        assert_eq!(mt.seek(b"zzz", 2), None);
    }

    #[test]
    fn test_prev_picks_visible_version() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("a", "old")]);
        mt.apply(2, &[put("b", "1")]);
        mt.apply(3, &[put("a", "new")]);
        mt.apply(4, &[del("b")]);

        assert_eq!(mt.prev_before(None, 4), Some((&b"a"[..], &b"new"[..])));
        assert_eq!(mt.prev_before(None, 2), Some((&b"b"[..], &b"1"[..])));
        assert_eq!(mt.prev_before(Some(b"b"), 2), Some((&b"a"[..], &b"old"[..])));
    }

    #[test]
    fn test_visible_is_sorted() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("c", "3"), put("a", "1"), put("b", "2")]);
        mt.apply(2, &[del("a")]);

        assert_eq!(keys(&mt, 1), vec!["a", "b", "c"]);
        assert_eq!(keys(&mt, 2), vec!["b", "c"]);
    }

    #[test]
    fn test_prune_keeps_what_readers_need() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("k", "v1"), put("gone", "x")]);
        mt.apply(2, &[put("k", "v2"), del("gone")]);
        mt.apply(3, &[put("k", "v3")]);

        let removed = mt.prune(2);
        assert_eq!(removed, 3);
        assert_eq!(mt.get(b"k", 2), Some(Some(b"v2".as_slice())));
        assert_eq!(mt.get(b"k", 3), Some(Some(b"v3".as_slice())));
        assert_eq!(mt.get(b"gone", 2), None);
        assert_eq!(mt.len(), 2);
    }

    #[test]
    fn test_size_tracking() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("key", "value")]);
        let one = mt.size_bytes();
        assert!(one > 0);

        mt.apply(1, &[put("key", "value")]);
        assert_eq!(mt.size_bytes(), one);

        mt.apply(2, &[del("key")]);
        mt.prune(2);
        assert_eq!(mt.size_bytes(), 0);
    }

    #[test]
    fn test_approximate_size() {
        let mut mt = Memtable::new();
        mt.apply(1, &[put("a", "1111"), put("b", "22"), put("c", "3")]);

        let all = mt.approximate_size(b"a", b"z");
        let ab = mt.approximate_size(b"a", b"c");
        assert!(all > ab && ab > 0);
        assert_eq!(mt.approximate_size(b"x", b"z"), 0);
        assert_eq!(mt.approximate_size(b"c", b"a"), 0);
    }
}
