//! Ordered key-value store contract.
//!
//! Keys are compared byte-lexicographically. Every collaborator above this
//! layer (sublevels, triggers, the range iterator) only relies on the
//! operations defined here.

use alloc::boxed::Box;
use alloc::vec::Vec;
use mapfold_core::Result;

/// A single write operation inside a `WriteBatch`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Sets `key` to `value`, replacing any previous value.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Removes `key` if present.
    Delete { key: Vec<u8> },
}

impl BatchOp {
    /// Returns the key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } => key,
            BatchOp::Delete { key } => key,
        }
    }

    /// Returns the value written, or None for a deletion.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            BatchOp::Put { value, .. } => Some(value),
            BatchOp::Delete { .. } => None,
        }
    }
}

/// An ordered list of writes applied in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Appends a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Appends a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Returns the operations in application order.
    #[inline]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of operations.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Removes all operations.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

/// A positioned view over the committed state of a store.
///
/// A fresh cursor is unpositioned and therefore invalid. Reading `key` or
/// `value` while invalid returns an empty slice.
pub trait Cursor {
    /// Positions at the first key greater than or equal to `key`.
    fn seek(&mut self, key: &[u8]);
    /// Positions at the first key of the store.
    fn seek_first(&mut self);
    /// Positions at the last key of the store.
    fn seek_last(&mut self);
    /// Moves to the next key. No-op when invalid.
    fn next(&mut self);
    /// Moves to the previous key. No-op when invalid.
    fn prev(&mut self);
    /// Returns true if the cursor sits on an entry.
    fn valid(&self) -> bool;
    /// Returns the current key.
    fn key(&self) -> &[u8];
    /// Returns the current value.
    fn value(&self) -> &[u8];
}

/// An ordered byte key-value store.
pub trait KvStore {
    /// Reads the value stored at `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes `value` at `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&batch)
    }

    /// Removes `key`.
    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&batch)
    }

    /// Applies every operation of `batch` in order.
    fn write(&self, batch: &WriteBatch) -> Result<()>;

    /// Opens a cursor over the currently committed state.
    fn cursor(&self) -> Box<dyn Cursor>;
}
