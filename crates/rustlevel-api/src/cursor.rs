//! Cursors and inclusive range scans.
//!
//! A [`Cursor`] holds one position in ascending key order and moves through
//! three states:
//!
//! ```text
//! BeforeFirst --first/seek/last--> Valid | Invalid
//! Valid       --next/prev-------> Valid | Invalid
//! Valid       --seek/first/last--> Valid | Invalid
//! Invalid     --seek/first/last--> Valid | Invalid
//! ```
//!
//! `next` and `prev` need a current position; from `BeforeFirst` or
//! `Invalid` they fail with [`Error::Precondition`] and change nothing.

use crate::blocking::run_blocking;
use crate::{engine_of, HandleInner};
use rustlevel_core::{DataFormat, Datum, EngineIterator, Error, Result};
use std::fmt;
use std::sync::Weak;

/// Where a cursor stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Freshly created, not positioned yet
    BeforeFirst,
    /// On an entry
    Valid,
    /// Moved past either end, or the last move failed
    Invalid,
}

/// Bounds of a range scan.
///
/// The scan starts at the first key `>= start` (or the first key) and stops
/// after visiting the key equal to `limit`. A limit that matches no key the
/// scan passes over does not stop it, so the scan runs to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRange {
    pub start: Option<Vec<u8>>,
    pub limit: Option<Vec<u8>>,
}

impl ScanRange {
    /// Every key in the store
    pub fn all() -> Self {
        Self::default()
    }

    /// Keys from `start` to the end
    pub fn starting_at(start: impl AsRef<[u8]>) -> Self {
        Self::all().with_start(start)
    }

    /// Keys from `start` up to and including `limit`
    pub fn between(start: impl AsRef<[u8]>, limit: impl AsRef<[u8]>) -> Self {
        Self::all().with_start(start).with_limit(limit)
    }

    pub fn with_start(mut self, start: impl AsRef<[u8]>) -> Self {
        self.start = Some(start.as_ref().to_vec());
        self
    }

    pub fn with_limit(mut self, limit: impl AsRef<[u8]>) -> Self {
        self.limit = Some(limit.as_ref().to_vec());
        self
    }
}

enum Step {
    First,
    Last,
    Seek(Vec<u8>),
    Next,
    Prev,
}

/// Apply one step and report whether the iterator landed on an entry
fn apply(iter: &mut dyn EngineIterator, step: &Step) -> Result<bool> {
    match step {
        Step::First => iter.seek_to_first(),
        Step::Last => iter.seek_to_last(),
        Step::Seek(target) => iter.seek(target),
        Step::Next => iter.next(),
        Step::Prev => iter.prev(),
    }
    iter.status()?;
    Ok(iter.valid())
}

/// Position in one store's key order.
///
/// The cursor reads from the state of the store when it was created and keeps
/// only a weak reference to its [`Handle`](crate::Handle): once the handle is
/// closed or dropped every call fails with [`Error::HandleClosed`].
pub struct Cursor {
    handle: Weak<HandleInner>,
    /// `None` while a non-blocking move owns it, or after such a move was
    /// abandoned
    iter: Option<Box<dyn EngineIterator>>,
    state: CursorState,
    format: DataFormat,
}

impl Cursor {
    pub(crate) fn new(
        handle: Weak<HandleInner>,
        iter: Box<dyn EngineIterator>,
        format: DataFormat,
    ) -> Self {
        Self {
            handle,
            iter: Some(iter),
            state: CursorState::BeforeFirst,
            format,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns true if the cursor is on an entry
    pub fn valid(&self) -> bool {
        self.state == CursorState::Valid
    }

    /// Format used by [`Cursor::key`], [`Cursor::value`] and [`Cursor::current`]
    pub fn format(&self) -> DataFormat {
        self.format
    }

    fn ensure_handle(&self) -> Result<()> {
        engine_of(&self.handle).map(|_| ())
    }

    fn check_step(&self, step: &Step) -> Result<()> {
        self.ensure_handle()?;
        if self.iter.is_none() {
            return Err(Error::Precondition(
                "cursor was lost by an abandoned non-blocking move".into(),
            ));
        }
        if matches!(step, Step::Next | Step::Prev) && self.state != CursorState::Valid {
            return Err(Error::Precondition(format!(
                "cannot step a cursor in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn settle(&mut self, moved: Result<bool>) -> Result<()> {
        match moved {
            Ok(true) => {
                self.state = CursorState::Valid;
                Ok(())
            }
            Ok(false) => {
                self.state = CursorState::Invalid;
                Ok(())
            }
            Err(e) => {
                self.state = CursorState::Invalid;
                Err(e)
            }
        }
    }

    fn step(&mut self, step: Step) -> Result<()> {
        self.check_step(&step)?;
        let moved = match self.iter.as_mut() {
            Some(iter) => apply(iter.as_mut(), &step),
            None => return Err(Error::Precondition("cursor has no iterator".into())),
        };
        self.settle(moved)
    }

    async fn step_async(&mut self, step: Step) -> Result<()> {
        self.check_step(&step)?;
        let mut iter = self
            .iter
            .take()
            .ok_or_else(|| Error::Precondition("cursor has no iterator".into()))?;

        let (iter, moved) = run_blocking(move || {
            let moved = apply(iter.as_mut(), &step);
            Ok((iter, moved))
        })
        .await?;

        self.iter = Some(iter);
        self.settle(moved)
    }

    /// Move to the first key
    pub fn first(&mut self) -> Result<()> {
        self.step(Step::First)
    }

    /// Move to the last key
    pub fn last(&mut self) -> Result<()> {
        self.step(Step::Last)
    }

    /// Move to the smallest key `>= target`
    pub fn seek(&mut self, target: impl AsRef<[u8]>) -> Result<()> {
        self.step(Step::Seek(target.as_ref().to_vec()))
    }

    /// Move to the following key
    pub fn next(&mut self) -> Result<()> {
        self.step(Step::Next)
    }

    /// Move to the preceding key
    pub fn prev(&mut self) -> Result<()> {
        self.step(Step::Prev)
    }

    pub async fn first_async(&mut self) -> Result<()> {
        self.step_async(Step::First).await
    }

    pub async fn last_async(&mut self) -> Result<()> {
        self.step_async(Step::Last).await
    }

    pub async fn seek_async(&mut self, target: impl AsRef<[u8]>) -> Result<()> {
        self.step_async(Step::Seek(target.as_ref().to_vec())).await
    }

    pub async fn next_async(&mut self) -> Result<()> {
        self.step_async(Step::Next).await
    }

    pub async fn prev_async(&mut self) -> Result<()> {
        self.step_async(Step::Prev).await
    }

    /// The iterator when positioned on an entry
    fn positioned(&self) -> Result<&dyn EngineIterator> {
        self.ensure_handle()?;
        match (&self.iter, self.state) {
            (Some(iter), CursorState::Valid) => Ok(iter.as_ref()),
            _ => Err(Error::InvalidPosition),
        }
    }

    pub fn key(&self) -> Result<Datum> {
        self.key_as(self.format)
    }

    pub fn value(&self) -> Result<Datum> {
        self.value_as(self.format)
    }

    /// Current key and value
    pub fn current(&self) -> Result<(Datum, Datum)> {
        self.current_as(self.format)
    }

    pub fn key_as(&self, format: DataFormat) -> Result<Datum> {
        let iter = self.positioned()?;
        Ok(Datum::decode(iter.key().to_vec(), format))
    }

    pub fn value_as(&self, format: DataFormat) -> Result<Datum> {
        let iter = self.positioned()?;
        Ok(Datum::decode(iter.value().to_vec(), format))
    }

    pub fn current_as(&self, format: DataFormat) -> Result<(Datum, Datum)> {
        let iter = self.positioned()?;
        Ok((
            Datum::decode(iter.key().to_vec(), format),
            Datum::decode(iter.value().to_vec(), format),
        ))
    }

    /// Hand the current pair to `visitor` unless the scan is over. Returns
    /// true if the scan should step further.
    fn visit<F>(&self, limit: Option<&[u8]>, visitor: &mut F) -> bool
    where
        F: FnMut(Result<(Datum, Datum)>),
    {
        if self.state != CursorState::Valid {
            return false;
        }
        let iter = match self.positioned() {
            Ok(iter) => iter,
            Err(e) => {
                visitor(Err(e));
                return false;
            }
        };

        let key = iter.key();
        let at_limit = limit == Some(key);

        visitor(Ok((
            Datum::decode(key.to_vec(), self.format),
            Datum::decode(iter.value().to_vec(), self.format),
        )));
        !at_limit
    }

    /// Visit every pair in `range` in ascending key order.
    ///
    /// The visitor sees each key once. Visiting the key equal to the limit or
    /// reaching the end of the store ends the scan quietly; a failed step is
    /// handed to the visitor as `Err` and ends it. Pairs already visited stay
    /// visited.
    pub fn for_range<F>(&mut self, range: &ScanRange, mut visitor: F)
    where
        F: FnMut(Result<(Datum, Datum)>),
    {
        let positioned = match &range.start {
            Some(start) => self.seek(start),
            None => self.first(),
        };
        if let Err(e) = positioned {
            visitor(Err(e));
            return;
        }

        let limit = range.limit.as_deref();
        while self.visit(limit, &mut visitor) {
            if let Err(e) = self.next() {
                visitor(Err(e));
                return;
            }
        }
    }

    /// Non-blocking [`Cursor::for_range`]; every reposition runs on the
    /// blocking pool.
    pub async fn for_range_async<F>(&mut self, range: &ScanRange, mut visitor: F)
    where
        F: FnMut(Result<(Datum, Datum)>),
    {
        let positioned = match &range.start {
            Some(start) => self.seek_async(start).await,
            None => self.first_async().await,
        };
        if let Err(e) = positioned {
            visitor(Err(e));
            return;
        }

        let limit = range.limit.as_deref();
        while self.visit(limit, &mut visitor) {
            if let Err(e) = self.next_async().await {
                visitor(Err(e));
                return;
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("format", &self.format)
            .finish()
    }
}
