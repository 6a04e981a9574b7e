//! Physical database handle with mutation hooks.
//!
//! `Db` owns the underlying store and fans every committed write out to the
//! registered `MutationHook`s. Hooks are held weakly: dropping the owner of a
//! hook unregisters it implicitly.

use crate::memory::MemoryStore;
use crate::store::{Cursor, KvStore, WriteBatch};
use crate::sublevel::Sublevel;
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use mapfold_core::Result;

/// Identifier of a registered hook.
pub type HookId = u64;

/// Observer of committed writes.
pub trait MutationHook {
    /// Called once per applied operation, after the store committed it.
    /// `value` is None for a deletion. `key` is the physical key.
    fn on_mutation(&self, key: &[u8], value: Option<&[u8]>);
}

struct DbInner {
    store: Box<dyn KvStore>,
    hooks: RefCell<Vec<(HookId, Weak<dyn MutationHook>)>>,
    next_hook_id: Cell<HookId>,
}

/// Shared handle to a physical store.
#[derive(Clone)]
pub struct Db {
    inner: Rc<DbInner>,
}

impl Db {
    /// Wraps a store.
    pub fn new(store: impl KvStore + 'static) -> Self {
        Self {
            inner: Rc::new(DbInner {
                store: Box::new(store),
                hooks: RefCell::new(Vec::new()),
                next_hook_id: Cell::new(1),
            }),
        }
    }

    /// Creates a database backed by a fresh `MemoryStore`.
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Returns a logical view over keys under `name`.
    pub fn sublevel(&self, name: &str) -> Sublevel {
        Sublevel::new(self.clone(), name)
    }

    /// Reads a physical key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.store.get(key)
    }

    /// Writes a physical key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Deletes a physical key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Applies a batch, then notifies hooks of each operation in order.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.store.write(&batch)?;
        tracing::trace!(ops = batch.len(), "batch committed");

        let hooks = self.live_hooks();
        if hooks.is_empty() {
            return Ok(());
        }
        for op in batch.ops() {
            for hook in &hooks {
                hook.on_mutation(op.key(), op.value());
            }
        }
        Ok(())
    }

    /// Opens a cursor over the committed state of the whole store.
    pub fn cursor(&self) -> Box<dyn Cursor> {
        self.inner.store.cursor()
    }

    /// Registers a hook and returns its id.
    pub fn register_hook(&self, hook: Weak<dyn MutationHook>) -> HookId {
        let id = self.inner.next_hook_id.get();
        self.inner.next_hook_id.set(id + 1);
        self.inner.hooks.borrow_mut().push((id, hook));
        id
    }

    /// Unregisters a hook. Returns true if it was registered.
    pub fn unregister_hook(&self, id: HookId) -> bool {
        let mut hooks = self.inner.hooks.borrow_mut();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Returns the number of hooks whose owner is still alive.
    pub fn hook_count(&self) -> usize {
        self.inner
            .hooks
            .borrow()
            .iter()
            .filter(|(_, hook)| hook.strong_count() > 0)
            .count()
    }

    /// Returns true if both handles point at the same physical store.
    pub fn same_store(&self, other: &Db) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn live_hooks(&self) -> Vec<Rc<dyn MutationHook>> {
        let mut hooks = self.inner.hooks.borrow_mut();
        hooks.retain(|(_, hook)| hook.strong_count() > 0);
        hooks.iter().filter_map(|(_, hook)| hook.upgrade()).collect()
    }
}

impl core::fmt::Debug for Db {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Db")
            .field("hooks", &self.inner.hooks.borrow().len())
            .finish()
    }
}
