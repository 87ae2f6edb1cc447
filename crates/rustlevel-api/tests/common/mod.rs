// Common test utilities for rustlevel integration tests

use rustlevel::{
    Cursor, Datum, Engine, EngineIterator, Error, Handle, KeyRange, Options, ReadOptions, Result,
    ScanRange, SnapshotId, StorageEngine, WriteBatch, WriteOptions,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Test fixture owning a temporary store directory
pub struct StoreFixture {
    #[allow(dead_code)]
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl StoreFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store");
        Self { temp_dir, path }
    }

    pub fn create_options() -> Options {
        Options::default().with_create_if_missing(true)
    }

    pub fn open(&self) -> Handle {
        self.open_with(&Self::create_options())
    }

    pub fn open_with(&self, options: &Options) -> Handle {
        Handle::open(&self.path, options).expect("Failed to open store")
    }
}

/// Run a range scan and collect text pairs, stopping at the first error
#[allow(dead_code)]
pub fn collect_range(cursor: &mut Cursor, range: &ScanRange) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut failure = None;
    cursor.for_range(range, |pair| match pair {
        Ok((key, value)) => pairs.push((key.to_string(), value.to_string())),
        Err(e) => failure = Some(e),
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(pairs),
    }
}

/// Convenience for comparing a datum with a string
#[allow(dead_code)]
pub fn text(datum: Datum) -> String {
    datum.to_string()
}

/// Engine wrapper whose writes can be made to fail on demand
#[allow(dead_code)]
pub struct FaultyEngine {
    inner: StorageEngine,
    fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl FaultyEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: StorageEngine::in_memory(),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Engine for FaultyEngine {
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(options, key)
    }

    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "injected write failure")));
        }
        self.inner.write(options, batch)
    }

    fn iter(&self, options: &ReadOptions) -> Result<Box<dyn EngineIterator>> {
        self.inner.iter(options)
    }

    fn snapshot(&self) -> Result<SnapshotId> {
        self.inner.snapshot()
    }

    fn release_snapshot(&self, snapshot: SnapshotId) {
        self.inner.release_snapshot(snapshot)
    }

    fn property(&self, name: &str) -> Option<String> {
        self.inner.property(name)
    }

    fn approximate_sizes(&self, ranges: &[KeyRange]) -> Result<Vec<u64>> {
        self.inner.approximate_sizes(ranges)
    }

    fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        self.inner.compact_range(start, limit)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
