//! In-memory ordered store.
//!
//! Data lives in a copy-on-write `BTreeMap`. Opening a cursor shares the
//! current map; the next write after that clones it, so cursors always see
//! the state that was committed when they were opened.

use crate::store::{BatchOp, Cursor, KvStore, WriteBatch};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ops::Bound;
use mapfold_core::Result;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// An ordered store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RefCell<Rc<Map>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RefCell::new(Rc::new(BTreeMap::new())),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.borrow().get(key).cloned())
    }

    fn write(&self, batch: &WriteBatch) -> Result<()> {
        let mut guard = self.data.borrow_mut();
        let map = Rc::make_mut(&mut guard);
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    map.remove(key.as_slice());
                }
            }
        }
        Ok(())
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(MemoryCursor::new(Rc::clone(&self.data.borrow())))
    }
}

/// Cursor over a snapshot of a `MemoryStore`.
pub struct MemoryCursor {
    snapshot: Rc<Map>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemoryCursor {
    fn new(snapshot: Rc<Map>) -> Self {
        Self {
            snapshot,
            current: None,
        }
    }

    fn land(&mut self, entry: Option<(&Vec<u8>, &Vec<u8>)>) {
        self.current = entry.map(|(k, v)| (k.clone(), v.clone()));
    }
}

impl Cursor for MemoryCursor {
    fn seek(&mut self, key: &[u8]) {
        let snapshot = Rc::clone(&self.snapshot);
        let entry = snapshot
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
        self.land(entry);
    }

    fn seek_first(&mut self) {
        let snapshot = Rc::clone(&self.snapshot);
        self.land(snapshot.iter().next());
    }

    fn seek_last(&mut self) {
        let snapshot = Rc::clone(&self.snapshot);
        self.land(snapshot.iter().next_back());
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let snapshot = Rc::clone(&self.snapshot);
        let entry = snapshot
            .range::<[u8], _>((Bound::Excluded(key.as_slice()), Bound::Unbounded))
            .next();
        self.land(entry);
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let snapshot = Rc::clone(&self.snapshot);
        let entry = snapshot
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_slice())))
            .next_back();
        self.land(entry);
    }

    #[inline]
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }
}
