//! Atomic write batches.

use crate::blocking::run_blocking;
use crate::{engine_of, Handle, HandleInner};
use rustlevel_core::{Engine, Error, Operation, Result, WriteBatch, WriteOptions};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Ordered puts and deletes that commit atomically.
///
/// Building a batch never touches the engine. A successful commit empties it
/// so it can be reused; a failed commit leaves every operation in place.
///
/// ```rust,no_run
/// use rustlevel::{Handle, WriteOptions};
///
/// let handle = Handle::in_memory();
/// let mut batch = handle.batch();
/// batch.put("foo", "bar").put("booz", "baz").delete("Hello");
/// batch.write(&WriteOptions::default())?;
/// assert!(batch.is_empty());
/// # Ok::<(), rustlevel::Error>(())
/// ```
#[derive(Default)]
pub struct Batch {
    handle: Option<Weak<HandleInner>>,
    ops: WriteBatch,
}

impl Batch {
    /// An empty batch with no bound handle. Commit it with
    /// [`Batch::write_to`] or [`Handle::write`].
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bound(handle: Weak<HandleInner>) -> Self {
        Self {
            handle: Some(handle),
            ops: WriteBatch::new(),
        }
    }

    /// Queue a put
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.ops.put(key.as_ref(), value.as_ref());
        self
    }

    /// Queue a delete
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.ops.delete(key.as_ref());
        self
    }

    /// Drop every queued operation
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued operations in commit order
    pub fn operations(&self) -> &[Operation] {
        self.ops.operations()
    }

    /// Returns true if the batch was created by [`Handle::batch`]
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    fn bound_engine(&self) -> Result<Arc<dyn Engine>> {
        match &self.handle {
            Some(handle) => engine_of(handle),
            None => Err(Error::NoHandle),
        }
    }

    /// Commit through the bound handle.
    ///
    /// Fails with [`Error::NoHandle`] if the batch is unbound and
    /// [`Error::HandleClosed`] if its handle is gone.
    pub fn write(&mut self, options: &WriteOptions) -> Result<()> {
        let engine = self.bound_engine()?;
        self.commit(engine.as_ref(), options)
    }

    /// Commit through `handle`, bound or not.
    pub fn write_to(&mut self, handle: &Handle, options: &WriteOptions) -> Result<()> {
        let engine = handle.engine()?;
        self.commit(engine.as_ref(), options)
    }

    /// Non-blocking [`Batch::write`]
    pub async fn write_async(&mut self, options: &WriteOptions) -> Result<()> {
        let engine = self.bound_engine()?;
        self.commit_async(engine, *options).await
    }

    /// Non-blocking [`Batch::write_to`]
    pub async fn write_to_async(&mut self, handle: &Handle, options: &WriteOptions) -> Result<()> {
        let engine = handle.engine()?;
        self.commit_async(engine, *options).await
    }

    fn commit(&mut self, engine: &dyn Engine, options: &WriteOptions) -> Result<()> {
        engine.write(options, &self.ops)?;
        debug!(ops = self.ops.len(), "Batch committed");
        self.ops.clear();
        Ok(())
    }

    async fn commit_async(&mut self, engine: Arc<dyn Engine>, options: WriteOptions) -> Result<()> {
        // The operations travel to the blocking pool and come back only on
        // failure; dropping this future mid-commit leaves the batch empty.
        let ops = std::mem::take(&mut self.ops);
        let (result, ops) = run_blocking(move || {
            let result = engine.write(&options, &ops);
            Ok((result, ops))
        })
        .await?;

        match result {
            Ok(()) => {
                debug!(ops = ops.len(), "Batch committed");
                Ok(())
            }
            Err(e) => {
                self.ops = ops;
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("bound", &self.is_bound())
            .field("ops", &self.ops.operations())
            .finish()
    }
}
