//! # rustlevel
//!
//! Client access layer for an ordered, durable key-value store.
//!
//! A [`Handle`] owns the connection to a store. [`Batch`]es collect puts and
//! deletes that commit atomically, and [`Cursor`]s walk the keys in ascending
//! byte order, including inclusive range scans.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rustlevel::{Handle, Options, WriteOptions};
//!
//! fn main() -> rustlevel::Result<()> {
//!     let handle = Handle::open("./my_store", &Options::default().with_create_if_missing(true))?;
//!
//!     handle.put("Hello", "World")?;
//!     assert_eq!(handle.get("Hello")?, "World");
//!
//!     // Atomic batch
//!     let mut batch = handle.batch();
//!     batch.put("foo", "bar").put("booz", "baz").delete("Hello");
//!     batch.write(&WriteOptions::default())?;
//!
//!     // Walk "b" ..= "f"
//!     let mut cursor = handle.cursor()?;
//!     cursor.for_range(&rustlevel::ScanRange::between("b", "f"), |pair| {
//!         if let Ok((key, value)) = pair {
//!             println!("{} = {}", key, value);
//!         }
//!     });
//!
//!     handle.close()
//! }
//! ```
//!
//! ## Non-blocking mode
//!
//! Every operation that reaches the engine has an `_async` twin that runs the
//! blocking work on tokio's blocking pool and resolves exactly once:
//!
//! ```rust,no_run
//! use rustlevel::{Handle, Options};
//!
//! # async fn run() -> rustlevel::Result<()> {
//! let handle = Handle::open_async("./my_store", &Options::default()).await?;
//! handle.put_async("key", "value").await?;
//! let value = handle.get_async("key").await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, info, warn};

mod batch;
mod blocking;
mod cursor;
pub mod logging;
mod snapshot;

use blocking::run_blocking;

pub use batch::Batch;
pub use cursor::{Cursor, CursorState, ScanRange};
pub use snapshot::Snapshot;

// Re-export core types
pub use rustlevel_core::{
    DataFormat, Datum, Engine, EngineIterator, Error, KeyRange, Operation, Options, ReadOptions,
    Result, SnapshotId, WriteBatch, WriteOptions,
};

// Reference engine
pub use rustlevel_storage::{properties, RepairReport, StorageEngine, StorageStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state behind a [`Handle`]. Batches, cursors and snapshots point at
/// it weakly.
pub(crate) struct HandleInner {
    engine: RwLock<Option<Arc<dyn Engine>>>,
    path: Option<PathBuf>,
}

impl HandleInner {
    /// The engine, or `HandleClosed` once the handle was closed
    pub(crate) fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.engine
            .read()
            .map_err(|_| Error::LockPoisoned)?
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::HandleClosed)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.engine.read().map(|e| e.is_some()).unwrap_or(false)
    }

    fn close(&self) -> Result<()> {
        let engine = self
            .engine
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .take();
        match engine {
            Some(engine) => {
                engine.close()?;
                info!(path = ?self.path, "Closed handle");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = ?self.path, error = %e, "Failed to close engine on drop");
        }
    }
}

/// Resolve a weak handle reference to its engine
pub(crate) fn engine_of(handle: &Weak<HandleInner>) -> Result<Arc<dyn Engine>> {
    handle.upgrade().ok_or(Error::HandleClosed)?.engine()
}

/// Handle to an open store.
///
/// Cheap to clone; clones share the same engine connection. The engine is
/// released by [`Handle::close`] or when the last clone is dropped, after
/// which every cursor, snapshot and bound batch fails with
/// [`Error::HandleClosed`].
///
/// # Examples
///
/// ```rust,no_run
/// use rustlevel::{Handle, Options};
///
/// let handle = Handle::open("./my_data", &Options::default().with_create_if_missing(true))?;
/// handle.put(b"key", b"value")?;
///
/// // Data persists across restarts
/// handle.close()?;
/// let handle = Handle::open("./my_data", &Options::default())?;
/// assert_eq!(handle.get(b"key")?, b"value");
/// # Ok::<(), rustlevel::Error>(())
/// ```
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    /// Opens the store at `path`.
    ///
    /// Fails with [`Error::NotFound`] if the store does not exist and
    /// `create_if_missing` is off, and with [`Error::Corruption`] when
    /// `paranoid_checks` is on and any persisted data fails its checksum.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let engine = StorageEngine::open(&path, options)?;
        info!(path = ?path, "Opened handle");
        Ok(Self::from_parts(Arc::new(engine), Some(path)))
    }

    /// Non-blocking [`Handle::open`]
    pub async fn open_async(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let options = options.clone();
        run_blocking(move || Self::open(path, &options)).await
    }

    /// Opens a non-durable store held entirely in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(StorageEngine::in_memory()), None)
    }

    /// Wraps an existing engine.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self::from_parts(engine, None)
    }

    fn from_parts(engine: Arc<dyn Engine>, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                engine: RwLock::new(Some(engine)),
                path,
            }),
        }
    }

    pub(crate) fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.inner.engine()
    }

    pub(crate) fn downgrade(&self) -> Weak<HandleInner> {
        Arc::downgrade(&self.inner)
    }

    /// Reads `key` as text. Missing keys fail with [`Error::NotFound`].
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Datum> {
        self.get_with(key, &ReadOptions::default())
    }

    /// Reads `key` with explicit options (format, snapshot).
    pub fn get_with(&self, key: impl AsRef<[u8]>, options: &ReadOptions) -> Result<Datum> {
        let key = key.as_ref();
        let engine = self.engine()?;
        lookup(engine.as_ref(), key, options)
    }

    /// Non-blocking [`Handle::get`]
    pub async fn get_async(&self, key: impl AsRef<[u8]>) -> Result<Datum> {
        self.get_with_async(key, &ReadOptions::default()).await
    }

    /// Non-blocking [`Handle::get_with`]
    pub async fn get_with_async(
        &self,
        key: impl AsRef<[u8]>,
        options: &ReadOptions,
    ) -> Result<Datum> {
        let engine = self.engine()?;
        let key = key.as_ref().to_vec();
        let options = *options;
        run_blocking(move || lookup(engine.as_ref(), &key, &options)).await
    }

    /// Stores `value` under `key`.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_with(key, value, &WriteOptions::default())
    }

    /// [`Handle::put`] with explicit write options.
    pub fn put_with(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: &WriteOptions,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key.as_ref(), value.as_ref());
        self.engine()?.write(options, &batch)
    }

    /// Non-blocking [`Handle::put`]
    pub async fn put_async(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key.as_ref(), value.as_ref());
        self.commit_async(batch, WriteOptions::default()).await
    }

    /// Removes `key`. Removing an absent key is not an error.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.delete_with(key, &WriteOptions::default())
    }

    /// [`Handle::delete`] with explicit write options.
    pub fn delete_with(&self, key: impl AsRef<[u8]>, options: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key.as_ref());
        self.engine()?.write(options, &batch)
    }

    /// Non-blocking [`Handle::delete`]
    pub async fn delete_async(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key.as_ref());
        self.commit_async(batch, WriteOptions::default()).await
    }

    async fn commit_async(&self, batch: WriteBatch, options: WriteOptions) -> Result<()> {
        let engine = self.engine()?;
        run_blocking(move || engine.write(&options, &batch)).await
    }

    /// Commits `batch` atomically. The batch is cleared on success and left
    /// untouched on failure.
    pub fn write(&self, batch: &mut Batch, options: &WriteOptions) -> Result<()> {
        batch.write_to(self, options)
    }

    /// Non-blocking [`Handle::write`]
    pub async fn write_async(&self, batch: &mut Batch, options: &WriteOptions) -> Result<()> {
        batch.write_to_async(self, options).await
    }

    /// A new empty batch bound to this handle.
    pub fn batch(&self) -> Batch {
        Batch::bound(self.downgrade())
    }

    /// A cursor over the latest state, returning text.
    pub fn cursor(&self) -> Result<Cursor> {
        self.cursor_with(&ReadOptions::default())
    }

    /// A cursor with explicit read options.
    ///
    /// The cursor reads from the state as of its creation (or the snapshot in
    /// `options`); later writes are not visible to it.
    pub fn cursor_with(&self, options: &ReadOptions) -> Result<Cursor> {
        let iter = self.engine()?.iter(options)?;
        debug!(format = ?options.format, snapshot = ?options.snapshot, "Created cursor");
        Ok(Cursor::new(self.downgrade(), iter, options.format))
    }

    /// A consistent read view of the current state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let id = self.engine()?.snapshot()?;
        Ok(Snapshot::new(self.downgrade(), id))
    }

    /// Engine property, such as [`properties::STATS`]. Unknown names yield
    /// `None`.
    pub fn property(&self, name: &str) -> Result<Option<String>> {
        Ok(self.engine()?.property(name))
    }

    /// Approximate stored bytes for each `(start, limit)` range. `start` is
    /// inclusive and `limit` exclusive.
    pub fn approximate_sizes<K, L>(&self, ranges: &[(K, L)]) -> Result<Vec<u64>>
    where
        K: AsRef<[u8]>,
        L: AsRef<[u8]>,
    {
        let ranges: Vec<KeyRange> = ranges
            .iter()
            .map(|(start, limit)| KeyRange::new(start, limit))
            .collect();
        self.engine()?.approximate_sizes(&ranges)
    }

    /// Forces the engine to checkpoint and drop obsolete data. `None` bounds
    /// mean the start or end of the key space.
    pub fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        self.engine()?.compact_range(start, limit)
    }

    /// Releases the engine. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Returns true until [`Handle::close`] is called
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Store directory, `None` for in-memory and wrapped engines
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Deletes the store at `path`. Do not call it on a store that is open.
    pub fn destroy(path: impl AsRef<Path>, options: &Options) -> Result<()> {
        StorageEngine::destroy(path, options)
    }

    /// Non-blocking [`Handle::destroy`]
    pub async fn destroy_async(path: impl AsRef<Path>, options: &Options) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let options = options.clone();
        run_blocking(move || Self::destroy(path, &options)).await
    }

    /// Rebuilds a damaged store from every record that can still be read.
    pub fn repair(path: impl AsRef<Path>, options: &Options) -> Result<RepairReport> {
        StorageEngine::repair(path, options)
    }

    /// Non-blocking [`Handle::repair`]
    pub async fn repair_async(path: impl AsRef<Path>, options: &Options) -> Result<RepairReport> {
        let path = path.as_ref().to_path_buf();
        let options = options.clone();
        run_blocking(move || Self::repair(path, &options)).await
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("path", &self.inner.path)
            .field("open", &self.is_open())
            .finish()
    }
}

fn lookup(engine: &dyn Engine, key: &[u8], options: &ReadOptions) -> Result<Datum> {
    match engine.get(options, key)? {
        Some(value) => Ok(Datum::decode(value, options.format)),
        None => Err(Error::NotFound(String::from_utf8_lossy(key).into_owned())),
    }
}
