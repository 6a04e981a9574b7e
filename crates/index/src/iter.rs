//! Prefix-scoped iteration over an encoded index.

use crate::codec::{self, SEQ_WIDTH};
use alloc::boxed::Box;
use alloc::vec::Vec;
use mapfold_core::Result;
use mapfold_storage::{Cursor, Sublevel};

/// A cursor restricted to keys that start with a fixed physical prefix.
///
/// The physical prefix is the administrative namespace prefix followed by an
/// application key prefix. `key()` hides both the administrative prefix and
/// the trailing sequence suffix. Once a movement leaves the prefix the
/// iterator stays invalid until it is positioned again.
pub struct RangeIterator {
    cursor: Box<dyn Cursor>,
    admin_len: usize,
    prefix: Vec<u8>,
    suffix_len: usize,
    valid: bool,
}

impl RangeIterator {
    /// Creates an iterator over keys starting with `admin ++ key_prefix`.
    /// Visible keys carry a sequence suffix, which `key()` strips.
    pub fn new(cursor: Box<dyn Cursor>, admin: &[u8], key_prefix: &[u8]) -> Self {
        let mut prefix = Vec::with_capacity(admin.len() + key_prefix.len());
        prefix.extend_from_slice(admin);
        prefix.extend_from_slice(key_prefix);
        Self {
            cursor,
            admin_len: admin.len(),
            prefix,
            suffix_len: SEQ_WIDTH,
            valid: false,
        }
    }

    /// Creates an iterator over the keys of `sublevel` starting with `key_prefix`.
    pub fn over(sublevel: &Sublevel, key_prefix: &[u8]) -> Self {
        Self::new(sublevel.cursor(), sublevel.prefix(), key_prefix)
    }

    /// Sets how many trailing bytes `key()` strips. Reduce node keys carry
    /// no sequence suffix and use 0.
    pub fn with_suffix(mut self, suffix_len: usize) -> Self {
        self.suffix_len = suffix_len;
        self
    }

    /// Returns the physical scan prefix.
    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Positions on the first key in range.
    pub fn seek_first(&mut self) {
        self.cursor.seek(&self.prefix);
        self.check();
    }

    /// Positions on the last key in range.
    pub fn seek_last(&mut self) {
        match successor(&self.prefix) {
            Some(bound) => {
                self.cursor.seek(&bound);
                if self.cursor.valid() {
                    self.cursor.prev();
                } else {
                    // Range ends at the end of the store.
                    self.cursor.seek_last();
                }
            }
            None => self.cursor.seek_last(),
        }
        self.check();
    }

    /// Positions on the first key in range not less than `partial`, given
    /// relative to the administrative prefix.
    pub fn seek(&mut self, partial: &[u8]) {
        let mut target = Vec::with_capacity(self.admin_len + partial.len());
        target.extend_from_slice(&self.prefix[..self.admin_len]);
        target.extend_from_slice(partial);
        if target < self.prefix {
            target.clone_from(&self.prefix);
        }
        self.cursor.seek(&target);
        self.check();
    }

    /// Moves to the next key. No-op when invalid.
    pub fn next(&mut self) {
        if self.valid {
            self.cursor.next();
            self.check();
        }
    }

    /// Moves to the previous key. No-op when invalid.
    pub fn prev(&mut self) {
        if self.valid {
            self.cursor.prev();
            self.check();
        }
    }

    /// Returns true when positioned on a key in range.
    #[inline]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Returns the visible key, or an empty slice when invalid.
    pub fn key(&self) -> &[u8] {
        if !self.valid {
            return &[];
        }
        let key = self.cursor.key();
        let end = key.len().saturating_sub(self.suffix_len).max(self.admin_len);
        &key[self.admin_len..end]
    }

    /// Returns the current value, or an empty slice when invalid.
    pub fn value(&self) -> &[u8] {
        if self.valid {
            self.cursor.value()
        } else {
            &[]
        }
    }

    /// Decodes the visible key into its components. Empty when invalid.
    pub fn components(&self) -> Result<Vec<Vec<u8>>> {
        if !self.valid {
            return Ok(Vec::new());
        }
        codec::decode_prefix(self.key())
    }

    /// Releases the underlying cursor.
    pub fn close(self) {}

    /// Consumes the iterator, yielding every `(visible key, value)` in
    /// ascending order.
    pub fn entries(mut self) -> Entries {
        self.seek_first();
        Entries { iter: self }
    }

    fn check(&mut self) {
        self.valid = self.cursor.valid() && self.cursor.key().starts_with(&self.prefix);
    }
}

impl core::fmt::Debug for RangeIterator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RangeIterator")
            .field("prefix", &self.prefix)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Owned `(key, value)` pairs of a `RangeIterator`, see [`RangeIterator::entries`].
pub struct Entries {
    iter: RangeIterator,
}

impl Iterator for Entries {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.iter.valid() {
            return None;
        }
        let item = (self.iter.key().to_vec(), self.iter.value().to_vec());
        self.iter.next();
        Some(item)
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
/// None when no such string exists (empty or all `0xFF`).
fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < 0xFF {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use mapfold_storage::{Db, MemoryStore};

    fn index_with(db: &Db, entries: &[(&[&str], u64, &str)]) -> Sublevel {
        let index = db.sublevel("idx");
        for (components, seq, value) in entries {
            let key = codec::encode(*components, *seq).unwrap();
            index.put(&key, value.as_bytes()).unwrap();
        }
        index
    }

    fn collect(mut iter: RangeIterator) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        iter.seek_first();
        while iter.valid() {
            out.push(iter.value().to_vec());
            iter.next();
        }
        out
    }

    #[test]
    fn test_successor() {
        assert_eq!(successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(successor(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(successor(&[0xFF, 0xFF]), None);
        assert_eq!(successor(b""), None);
    }

    #[test]
    fn test_scoped_forward_and_backward() {
        let db = Db::memory();
        let index = index_with(
            &db,
            &[
                (&["Fish"], 1, "Sushi"),
                (&["Fish"], 2, "Forelle Blau"),
                (&["Fisher"], 3, "Other"),
                (&["Pig"], 4, "Pulled Pork"),
            ],
        );
        db.sublevel("zzz").put(b"k", b"outside").unwrap();

        let prefix = codec::encode_prefix(&["Fish"]).unwrap();
        assert_eq!(
            collect(RangeIterator::over(&index, &prefix)),
            vec![b"Sushi".to_vec(), b"Forelle Blau".to_vec()]
        );

        let mut iter = RangeIterator::over(&index, &prefix);
        iter.seek_last();
        assert_eq!(iter.value(), b"Forelle Blau");
        iter.prev();
        assert_eq!(iter.value(), b"Sushi");
        iter.prev();
        assert!(!iter.valid());
        // Invalid stays invalid.
        iter.next();
        assert!(!iter.valid());
    }

    #[test]
    fn test_key_strips_admin_and_seq() {
        let db = Db::memory();
        let index = index_with(&db, &[(&["Fish"], 7, "Sushi")]);

        let mut iter = RangeIterator::over(&index, b"");
        iter.seek_first();
        assert_eq!(iter.key(), codec::encode_prefix(&["Fish"]).unwrap().as_slice());
        assert_eq!(iter.components().unwrap(), vec![b"Fish".to_vec()]);
    }

    #[test]
    fn test_invalid_reads_are_empty() {
        let db = Db::memory();
        let index = db.sublevel("idx");
        let mut iter = RangeIterator::over(&index, b"");
        assert!(!iter.valid());
        assert_eq!(iter.key(), b"");
        assert_eq!(iter.value(), b"");
        assert!(iter.components().unwrap().is_empty());
        iter.seek_first();
        assert!(!iter.valid());
        iter.seek_last();
        assert!(!iter.valid());
        iter.close();
    }

    #[test]
    fn test_seek_last_at_end_of_store() {
        let db = Db::new(MemoryStore::new());
        let index = index_with(&db, &[(&["a"], 1, "first"), (&["b"], 2, "last")]);
        db.sublevel("aaa").put(b"k", b"before").unwrap();

        let mut iter = RangeIterator::over(&index, b"");
        iter.seek_last();
        assert!(iter.valid());
        assert_eq!(iter.value(), b"last");
        iter.next();
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_last_before_following_range() {
        let db = Db::memory();
        let index = index_with(&db, &[(&["a"], 1, "first"), (&["b"], 2, "last")]);
        db.sublevel("zzz").put(b"k", b"after").unwrap();

        let mut iter = RangeIterator::over(&index, b"");
        iter.seek_last();
        assert_eq!(iter.value(), b"last");
    }

    #[test]
    fn test_seek_clamps_to_prefix() {
        let db = Db::memory();
        let index = index_with(
            &db,
            &[(&["a"], 1, "a1"), (&["b"], 2, "b2"), (&["b"], 3, "b3"), (&["c"], 4, "c4")],
        );
        let prefix = codec::encode_prefix(&["b"]).unwrap();

        let mut iter = RangeIterator::over(&index, &prefix);
        iter.seek(b"");
        assert_eq!(iter.value(), b"b2");

        iter.seek(&codec::encode(&["b"], 3).unwrap());
        assert_eq!(iter.value(), b"b3");

        iter.seek(&codec::encode(&["c"], 0).unwrap());
        assert!(!iter.valid());
    }

    #[test]
    fn test_entries() {
        let db = Db::memory();
        let index = index_with(&db, &[(&["x"], 1, "one"), (&["x", "y"], 2, "two")]);
        let entries: Vec<_> = RangeIterator::over(&index, b"").entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, b"one".to_vec());
        assert_eq!(entries[1].0, codec::encode_prefix(&["x", "y"]).unwrap());
    }

    #[test]
    fn test_without_suffix() {
        let db = Db::memory();
        let nodes = db.sublevel("nodes");
        let node = codec::encode_prefix(&["Germany"]).unwrap();
        nodes.put(&node, b"3").unwrap();

        let mut iter = RangeIterator::over(&nodes, b"").with_suffix(0);
        iter.seek_first();
        assert_eq!(iter.key(), node.as_slice());
        assert_eq!(iter.components().unwrap(), vec![b"Germany".to_vec()]);
    }
}
