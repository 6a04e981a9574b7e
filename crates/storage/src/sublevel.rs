//! Logical key ranges over a physical store.
//!
//! A sublevel named `name` owns every physical key starting with
//! `name ++ 0x00`. Keys passed to a sublevel are relative to that prefix.

use crate::db::Db;
use crate::store::{Cursor, WriteBatch};
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use mapfold_core::Result;

/// Separator appended to a sublevel name to form its prefix.
pub const SUBLEVEL_SEPARATOR: u8 = 0x00;

/// A namespace inside a `Db`.
#[derive(Clone, Debug)]
pub struct Sublevel {
    db: Db,
    name: String,
    prefix: Vec<u8>,
}

impl Sublevel {
    /// Creates the view for `name` on `db`.
    pub fn new(db: Db, name: &str) -> Self {
        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(SUBLEVEL_SEPARATOR);
        Self {
            db,
            name: name.to_string(),
            prefix,
        }
    }

    /// Returns the sublevel name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the physical prefix of this sublevel.
    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Returns the underlying physical database.
    #[inline]
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Returns a sibling sublevel on the same physical database.
    pub fn sibling(&self, name: &str) -> Sublevel {
        self.db.sublevel(name)
    }

    /// Builds the physical key for a relative key.
    pub fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    /// Strips this sublevel's prefix from a physical key.
    /// Returns None if the key lies outside the sublevel.
    pub fn strip<'a>(&self, physical: &'a [u8]) -> Option<&'a [u8]> {
        physical.strip_prefix(self.prefix.as_slice())
    }

    /// Returns true if the physical key belongs to this sublevel.
    #[inline]
    pub fn contains(&self, physical: &[u8]) -> bool {
        physical.starts_with(&self.prefix)
    }

    /// Reads a relative key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(&self.key(key))
    }

    /// Writes a relative key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(&self.key(key), value)
    }

    /// Deletes a relative key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(&self.key(key))
    }

    /// Queues a put of a relative key into a physical batch.
    pub fn batch_put(&self, batch: &mut WriteBatch, key: &[u8], value: &[u8]) {
        batch.put(self.key(key), value);
    }

    /// Queues a delete of a relative key into a physical batch.
    pub fn batch_delete(&self, batch: &mut WriteBatch, key: &[u8]) {
        batch.delete(self.key(key));
    }

    /// Applies a physical batch on the underlying database.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)
    }

    /// Opens a cursor over the whole physical store.
    ///
    /// Keys returned by the cursor are physical; scope them with `strip`
    /// or wrap the cursor in a range iterator.
    pub fn cursor(&self) -> Box<dyn Cursor> {
        self.db.cursor()
    }

    /// Returns every relative key of this sublevel, in order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut cursor = self.db.cursor();
        let mut keys = Vec::new();
        cursor.seek(&self.prefix);
        while cursor.valid() {
            match self.strip(cursor.key()) {
                Some(key) => keys.push(key.to_vec()),
                None => break,
            }
            cursor.next();
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_sublevels_are_isolated() {
        let db = Db::memory();
        let input = db.sublevel("input");
        let index = db.sublevel("index");

        input.put(b"k", b"from-input").unwrap();
        index.put(b"k", b"from-index").unwrap();

        assert_eq!(input.get(b"k").unwrap(), Some(b"from-input".to_vec()));
        assert_eq!(index.get(b"k").unwrap(), Some(b"from-index".to_vec()));
        assert_eq!(db.get(b"input\x00k").unwrap(), Some(b"from-input".to_vec()));

        input.delete(b"k").unwrap();
        assert_eq!(input.get(b"k").unwrap(), None);
        assert_eq!(index.get(b"k").unwrap(), Some(b"from-index".to_vec()));
    }

    #[test]
    fn test_prefix_and_strip() {
        let db = Db::memory();
        let sub = db.sublevel("job");
        assert_eq!(sub.prefix(), b"job\x00");
        assert_eq!(sub.key(b"abc"), b"job\x00abc".to_vec());
        assert_eq!(sub.strip(b"job\x00abc"), Some(b"abc".as_slice()));
        assert_eq!(sub.strip(b"jobs\x00abc"), None);
        assert!(sub.contains(b"job\x00"));
        assert!(sub.db().same_store(&db));
    }

    #[test]
    fn test_batch_across_sublevels() {
        let db = Db::memory();
        let a = db.sublevel("a");
        let b = a.sibling("b");

        let mut batch = WriteBatch::new();
        a.batch_put(&mut batch, b"1", b"x");
        b.batch_put(&mut batch, b"2", b"y");
        a.batch_delete(&mut batch, b"1");
        a.write(batch).unwrap();

        assert_eq!(a.keys(), Vec::<Vec<u8>>::new());
        assert_eq!(b.keys(), vec![b"2".to_vec()]);
    }

    #[test]
    fn test_keys_stop_at_sublevel_end() {
        let db = Db::memory();
        db.put(b"a\x00zzz", b"").unwrap();
        let b = db.sublevel("b");
        b.put(b"2", b"").unwrap();
        b.put(b"1", b"").unwrap();
        db.put(b"c\x00first", b"").unwrap();

        assert_eq!(b.keys(), vec![b"1".to_vec(), b"2".to_vec()]);
    }
}
