//! Write batches.
//!
//! A [`WriteBatch`] is an ordered list of [`Operation`]s that an engine
//! applies atomically. Operations apply in insertion order, so when a key
//! appears more than once the last operation wins.

use serde::{Deserialize, Serialize};

/// A single pending mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert or overwrite `key`
    Put {
        /// Key to write
        key: Vec<u8>,
        /// New value
        value: Vec<u8>,
    },
    /// Remove `key`
    Delete {
        /// Key to remove
        key: Vec<u8>,
    },
}

impl Operation {
    /// The key this operation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }

    /// Approximate encoded size, used for write accounting
    pub fn size(&self) -> usize {
        match self {
            Operation::Put { key, value } => key.len() + value.len() + 1,
            Operation::Delete { key } => key.len() + 1,
        }
    }
}

/// An ordered collection of operations committed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<Operation>,
}

impl WriteBatch {
    /// Creates an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.ops.push(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self
    }

    /// Appends a delete
    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.ops.push(Operation::Delete { key: key.to_vec() });
        self
    }

    /// Removes every pending operation
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if there is nothing to commit
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Pending operations in insertion order
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Sum of [`Operation::size`] over the batch
    pub fn approximate_size(&self) -> usize {
        self.ops.iter().map(Operation::size).sum()
    }

    /// Consumes the batch, yielding its operations
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }
}

impl From<Vec<Operation>> for WriteBatch {
    fn from(ops: Vec<Operation>) -> Self {
        Self { ops }
    }
}
