//! Point-in-time read views.

use crate::HandleInner;
use rustlevel_core::{ReadOptions, SnapshotId};
use std::sync::Weak;

/// A consistent view of the store as of [`Handle::snapshot`](crate::Handle::snapshot).
///
/// Pass [`Snapshot::read_options`] (or `ReadOptions::with_snapshot(snap.id())`)
/// to reads and cursors to see that state. Dropping the snapshot lets the
/// engine reclaim the versions it kept alive.
#[derive(Debug)]
pub struct Snapshot {
    handle: Weak<HandleInner>,
    id: SnapshotId,
}

impl Snapshot {
    pub(crate) fn new(handle: Weak<HandleInner>, id: SnapshotId) -> Self {
        Self { handle, id }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Default read options pinned to this snapshot
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions::default().with_snapshot(self.id)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        // A closed handle has already released everything
        if let Some(inner) = self.handle.upgrade() {
            if let Ok(engine) = inner.engine() {
                engine.release_snapshot(self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{properties, Handle};

    #[test]
    fn test_snapshot_reads_old_state() {
        let handle = Handle::in_memory();
        handle.put("k", "v1").unwrap();
        let snapshot = handle.snapshot().unwrap();
        handle.put("k", "v2").unwrap();
        handle.put("new", "x").unwrap();

        let options = snapshot.read_options();
        assert_eq!(handle.get_with("k", &options).unwrap(), "v1");
        assert!(handle.get_with("new", &options).unwrap_err().is_not_found());
        assert_eq!(handle.get("k").unwrap(), "v2");
    }

    #[test]
    fn test_drop_releases_snapshot() {
        let handle = Handle::in_memory();
        handle.put("k", "v1").unwrap();
        let snapshot = handle.snapshot().unwrap();
        handle.put("k", "v2").unwrap();
        drop(snapshot);

        handle.compact_range(None, None).unwrap();
        let stats = handle.property(properties::STATS).unwrap().unwrap();
        assert!(stats.contains("versions: 1"));
        assert!(stats.contains("pinned-snapshots: 0"));
    }

    #[test]
    fn test_outlives_handle() {
        let handle = Handle::in_memory();
        let snapshot = handle.snapshot().unwrap();
        handle.close().unwrap();
        drop(snapshot);
    }
}
