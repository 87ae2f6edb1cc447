//! # rustlevel core
//!
//! Shared types for rustlevel: errors, options, write batches, the [`Datum`]
//! returned by reads, and the [`Engine`] contract that storage backends
//! implement.
//!
//! This crate is an internal implementation detail. Use the `rustlevel` crate
//! instead.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod datum;
pub mod error;
pub mod format_version;
pub mod options;
pub mod storage;

pub use batch::{Operation, WriteBatch};
pub use datum::Datum;
pub use error::{Error, Result};
pub use options::{DataFormat, Options, ReadOptions, WriteOptions};
pub use storage::{Engine, EngineIterator, KeyRange, SnapshotId};
