//! Change triggers over a watched sublevel.
//!
//! A `Trigger` observes every committed write under its source sublevel and
//! records the touched key in a backlog sublevel. Draining the backlog re-reads
//! the current source value and hands a `Mutation` to the handler; the backlog
//! entry is removed only after the handler succeeds, so delivery is
//! at-least-once and survives handler failures.
//!
//! A transient failure (storage unavailable) stops the drain and leaves the
//! backlog as it is. Any other failure will not go away by retrying the same
//! input, so the key is parked in a `#failed` sublevel next to the backlog
//! and the drain moves on to the remaining keys. A later write to a parked
//! key delivers it again.
//!
//! # Example
//!
//! ```rust
//! use mapfold_reactive::{Mutation, Trigger, TriggerOptions};
//! use mapfold_storage::Db;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let db = Db::memory();
//! let source = db.sublevel("input");
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let trigger = Trigger::watch(
//!     "log",
//!     &source,
//!     &db.sublevel("log#backlog"),
//!     None,
//!     move |m: &Mutation| -> mapfold_core::Result<()> {
//!         sink.borrow_mut().push(m.clone());
//!         Ok(())
//!     },
//!     TriggerOptions::default(),
//! )
//! .unwrap();
//!
//! source.put(b"a", b"1").unwrap();
//! assert_eq!(seen.borrow()[0], Mutation::put(b"a".as_slice(), b"1".as_slice()));
//! assert_eq!(trigger.pending().unwrap(), 0);
//! ```

use crate::mutation::{Mutation, MutationHandler};
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use mapfold_core::{Clock, Error, MonotonicClock, Result};
use mapfold_storage::{HookId, MutationHook, Sublevel, WriteBatch};

/// Suffix appended to the backlog name for parked keys.
pub const FAILED_SUFFIX: &str = "#failed";

/// Decides whether a source mutation is recorded. Receives the relative key
/// and the written value (None for a deletion).
pub type FilterFn = Box<dyn Fn(&[u8], Option<&[u8]>) -> bool>;

/// When recorded mutations are handed to the handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Drain inside the write that produced the mutation.
    #[default]
    Immediate,
    /// Only record; the host drains with `work_off`.
    Deferred,
}

/// Trigger configuration.
#[derive(Clone, Debug, Default)]
pub struct TriggerOptions {
    /// Delivery mode.
    pub delivery: Delivery,
}

impl TriggerOptions {
    /// Creates options with immediate delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options with deferred delivery.
    pub fn deferred() -> Self {
        Self {
            delivery: Delivery::Deferred,
        }
    }

    /// Sets the delivery mode.
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }
}

struct TriggerInner {
    name: String,
    source: Sublevel,
    backlog: Sublevel,
    failed: Sublevel,
    filter: Option<FilterFn>,
    handler: RefCell<Box<dyn MutationHandler>>,
    options: TriggerOptions,
    hook_id: Cell<Option<HookId>>,
    draining: Cell<bool>,
    closed: Cell<bool>,
    delivered: Cell<u64>,
}

impl TriggerInner {
    /// Records `key` as pending. The stored generation lets a drain detect
    /// that the key was touched again while its mutation was being handled.
    fn enqueue(&self, key: &[u8]) -> Result<()> {
        let generation = MonotonicClock.next();
        self.backlog.put(key, &generation.to_be_bytes())
    }

    fn next_pending(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut cursor = self.backlog.cursor();
        cursor.seek(self.backlog.prefix());
        if !cursor.valid() {
            return None;
        }
        self.backlog
            .strip(cursor.key())
            .map(|key| (key.to_vec(), cursor.value().to_vec()))
    }

    fn drain(&self) -> Result<usize> {
        if self.closed.get() {
            return Err(Error::closed(&self.name));
        }
        // A drain triggered from inside the handler only records; the
        // outer loop picks the new entries up.
        if self.draining.replace(true) {
            return Ok(0);
        }
        let result = self.drain_backlog();
        self.draining.set(false);
        result
    }

    fn drain_backlog(&self) -> Result<usize> {
        let mut delivered = 0;
        while let Some((key, generation)) = self.next_pending() {
            if self.closed.get() {
                break;
            }
            let value = self.source.get(&key)?;
            let mutation = Mutation { key, value };
            tracing::debug!(
                trigger = %self.name,
                key_len = mutation.key.len(),
                present = mutation.value.is_some(),
                "delivering mutation"
            );

            let result = self.handler.borrow_mut().handle(&mutation);
            let mut batch = WriteBatch::new();
            let parked = match result {
                Ok(()) => {
                    if self.failed.get(&mutation.key)?.is_some() {
                        self.failed.batch_delete(&mut batch, &mutation.key);
                    }
                    false
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    tracing::error!(
                        trigger = %self.name,
                        error = %err,
                        fatal = err.is_fatal(),
                        "handler failed, key parked"
                    );
                    self.failed.batch_put(&mut batch, &mutation.key, &generation);
                    true
                }
            };
            if self.backlog.get(&mutation.key)?.as_deref() == Some(generation.as_slice()) {
                self.backlog.batch_delete(&mut batch, &mutation.key);
            }
            if !batch.is_empty() {
                self.backlog.write(batch)?;
            }
            if parked {
                continue;
            }
            delivered += 1;
            self.delivered.set(self.delivered.get() + 1);
        }
        Ok(delivered)
    }
}

impl MutationHook for TriggerInner {
    fn on_mutation(&self, key: &[u8], value: Option<&[u8]>) {
        if self.closed.get() {
            return;
        }
        let Some(relative) = self.source.strip(key) else {
            return;
        };
        if let Some(filter) = &self.filter {
            if !filter(relative, value) {
                return;
            }
        }
        if let Err(err) = self.enqueue(relative) {
            tracing::error!(trigger = %self.name, error = %err, "failed to record mutation");
            return;
        }
        if self.options.delivery == Delivery::Immediate {
            if let Err(err) = self.drain() {
                tracing::warn!(
                    trigger = %self.name,
                    error = %err,
                    "mutation left in backlog for redelivery"
                );
            }
        }
    }
}

/// Returns the highest generation stored in `range`.
fn last_generation(range: &Sublevel) -> Option<u64> {
    let mut cursor = range.cursor();
    cursor.seek(range.prefix());
    let mut last = None;
    while cursor.valid() && range.contains(cursor.key()) {
        if let Ok(bytes) = <[u8; 8]>::try_from(cursor.value()) {
            last = last.max(Some(u64::from_be_bytes(bytes)));
        }
        cursor.next();
    }
    last
}

/// A subscription delivering mutations of a source sublevel to a handler.
///
/// Clones share the same subscription. The hook is unregistered by `close`
/// or when the last clone is dropped.
#[derive(Clone)]
pub struct Trigger {
    inner: Rc<TriggerInner>,
}

impl Trigger {
    /// Starts watching `source`.
    ///
    /// Pending work is persisted in `backlog`, which must live on the same
    /// physical database as `source` and must not overlap it. Keys whose
    /// handler failed for good are parked in the backlog's `#failed`
    /// sibling.
    pub fn watch<H>(
        name: &str,
        source: &Sublevel,
        backlog: &Sublevel,
        filter: Option<FilterFn>,
        handler: H,
        options: TriggerOptions,
    ) -> Result<Self>
    where
        H: MutationHandler + 'static,
    {
        if !source.db().same_store(backlog.db()) {
            return Err(Error::invalid_operation(
                "trigger backlog must share the source database",
            ));
        }
        let failed = backlog.sibling(&format!("{}{}", backlog.name(), FAILED_SUFFIX));
        for range in [backlog, &failed] {
            if source.prefix().starts_with(range.prefix())
                || range.prefix().starts_with(source.prefix())
            {
                return Err(Error::invalid_operation(
                    "trigger backlog must not overlap the watched range",
                ));
            }
        }

        // Generations recorded by an earlier run must not be handed out again.
        for range in [backlog, &failed] {
            if let Some(generation) = last_generation(range) {
                MonotonicClock.observe(generation);
            }
        }

        let inner = Rc::new(TriggerInner {
            name: name.to_string(),
            source: source.clone(),
            backlog: backlog.clone(),
            failed,
            filter,
            handler: RefCell::new(Box::new(handler)),
            options,
            hook_id: Cell::new(None),
            draining: Cell::new(false),
            closed: Cell::new(false),
            delivered: Cell::new(0),
        });
        let weak: Weak<dyn MutationHook> = Rc::downgrade(&inner) as Weak<dyn MutationHook>;
        inner.hook_id.set(Some(source.db().register_hook(weak)));
        tracing::debug!(trigger = %name, source = %source.name(), "trigger registered");

        Ok(Self { inner })
    }

    /// Returns the trigger name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the watched sublevel.
    #[inline]
    pub fn source(&self) -> &Sublevel {
        &self.inner.source
    }

    /// Returns the configured delivery mode.
    #[inline]
    pub fn delivery(&self) -> Delivery {
        self.inner.options.delivery
    }

    /// Synchronously delivers every pending mutation.
    ///
    /// Returns the number of mutations delivered. A transient handler
    /// failure stops the drain and leaves that mutation and the rest of the
    /// backlog pending. Any other failure parks the key and the drain goes
    /// on with the next one.
    pub fn work_off(&self) -> Result<usize> {
        self.inner.drain()
    }

    /// Records `key` as pending without a write to the source.
    pub fn enqueue(&self, key: &[u8]) -> Result<()> {
        if self.inner.closed.get() {
            return Err(Error::closed(&self.inner.name));
        }
        self.inner.enqueue(key)
    }

    /// Records every key currently in the source as pending, so records
    /// written before the trigger existed are delivered by the next drain.
    pub fn backfill(&self) -> Result<usize> {
        let keys = self.inner.source.keys();
        for key in &keys {
            self.enqueue(key)?;
        }
        Ok(keys.len())
    }

    /// Returns the number of recorded, undelivered mutations.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.inner.backlog.keys().len())
    }

    /// Returns the parked keys, in key order.
    pub fn failed(&self) -> Vec<Vec<u8>> {
        self.inner.failed.keys()
    }

    /// Moves every parked key back into the backlog. The next drain delivers
    /// them again. Returns how many were moved.
    pub fn requeue_failed(&self) -> Result<usize> {
        if self.inner.closed.get() {
            return Err(Error::closed(&self.inner.name));
        }
        let keys = self.inner.failed.keys();
        for key in &keys {
            self.inner.enqueue(key)?;
            self.inner.failed.delete(key)?;
        }
        Ok(keys.len())
    }

    /// Returns the total number of mutations delivered by this trigger.
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.get()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Stops delivery and unregisters the hook. The backlog is kept.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        if let Some(id) = self.inner.hook_id.take() {
            self.inner.source.db().unregister_hook(id);
        }
        tracing::debug!(trigger = %self.inner.name, "trigger closed");
    }
}

impl core::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.inner.name)
            .field("delivery", &self.inner.options.delivery)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use mapfold_storage::Db;

    type Log = Rc<RefCell<Vec<Mutation>>>;

    fn recording_trigger(db: &Db, options: TriggerOptions) -> (Trigger, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let trigger = Trigger::watch(
            "rec",
            &db.sublevel("input"),
            &db.sublevel("rec#backlog"),
            None,
            move |m: &Mutation| -> Result<()> {
                sink.borrow_mut().push(m.clone());
                Ok(())
            },
            options,
        )
        .unwrap();
        (trigger, log)
    }

    #[test]
    fn test_immediate_delivery() {
        let db = Db::memory();
        let (trigger, log) = recording_trigger(&db, TriggerOptions::new());
        let input = db.sublevel("input");

        input.put(b"a", b"1").unwrap();
        input.delete(b"a").unwrap();
        db.sublevel("other").put(b"a", b"x").unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Mutation::put(b"a".as_slice(), b"1".as_slice()),
                Mutation::delete(b"a".as_slice()),
            ]
        );
        assert_eq!(trigger.pending().unwrap(), 0);
        assert_eq!(trigger.delivered(), 2);
    }

    #[test]
    fn test_deferred_delivery_reads_current_value() {
        let db = Db::memory();
        let (trigger, log) = recording_trigger(&db, TriggerOptions::deferred());
        let input = db.sublevel("input");

        input.put(b"b", b"1").unwrap();
        input.put(b"a", b"1").unwrap();
        input.put(b"b", b"2").unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(trigger.pending().unwrap(), 2);

        assert_eq!(trigger.work_off().unwrap(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                Mutation::put(b"a".as_slice(), b"1".as_slice()),
                Mutation::put(b"b".as_slice(), b"2".as_slice()),
            ]
        );
        assert_eq!(trigger.work_off().unwrap(), 0);
    }

    #[test]
    fn test_failed_handler_keeps_backlog() {
        let db = Db::memory();
        let input = db.sublevel("input");
        let failing = Rc::new(Cell::new(true));
        let flag = failing.clone();
        let trigger = Trigger::watch(
            "flaky",
            &input,
            &db.sublevel("flaky#backlog"),
            None,
            move |_: &Mutation| -> Result<()> {
                if flag.get() {
                    Err(Error::storage("unavailable"))
                } else {
                    Ok(())
                }
            },
            TriggerOptions::new(),
        )
        .unwrap();

        input.put(b"a", b"1").unwrap();
        assert_eq!(trigger.pending().unwrap(), 1);

        let err = trigger.work_off().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(trigger.pending().unwrap(), 1);

        failing.set(false);
        assert_eq!(trigger.work_off().unwrap(), 1);
        assert_eq!(trigger.pending().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_key_is_parked_and_others_drain() {
        let db = Db::memory();
        let input = db.sublevel("input");
        let broken = Rc::new(Cell::new(true));
        let flag = broken.clone();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let trigger = Trigger::watch(
            "strict",
            &input,
            &db.sublevel("strict#backlog"),
            None,
            move |m: &Mutation| -> Result<()> {
                if flag.get() && m.key == b"a" {
                    return Err(Error::corruption(m.key.clone(), "bad ledger"));
                }
                sink.borrow_mut().push(m.clone());
                Ok(())
            },
            TriggerOptions::new(),
        )
        .unwrap();

        input.put(b"a", b"1").unwrap();
        input.put(b"b", b"2").unwrap();
        input.put(b"c", b"3").unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Mutation::put(b"b".as_slice(), b"2".as_slice()),
                Mutation::put(b"c".as_slice(), b"3".as_slice()),
            ]
        );
        assert_eq!(trigger.pending().unwrap(), 0);
        assert_eq!(trigger.failed(), vec![b"a".to_vec()]);
        assert_eq!(db.sublevel("strict#backlog#failed").keys(), vec![b"a".to_vec()]);

        // A new write retries the key and parks it again.
        input.put(b"a", b"4").unwrap();
        assert_eq!(trigger.work_off().unwrap(), 0);
        assert_eq!(trigger.failed(), vec![b"a".to_vec()]);

        broken.set(false);
        assert_eq!(trigger.requeue_failed().unwrap(), 1);
        assert_eq!(trigger.work_off().unwrap(), 1);
        assert!(trigger.failed().is_empty());
        assert_eq!(log.borrow().last(), Some(&Mutation::put(b"a".as_slice(), b"4".as_slice())));
    }

    #[test]
    fn test_watch_resumes_after_stored_generations() {
        let db = Db::memory();
        let backlog = db.sublevel("resume#backlog");
        let stored = 1u64 << 40;
        backlog.put(b"old", &stored.to_be_bytes()).unwrap();

        let _trigger = Trigger::watch(
            "resume",
            &db.sublevel("input"),
            &backlog,
            None,
            |_: &Mutation| -> Result<()> { Ok(()) },
            TriggerOptions::deferred(),
        )
        .unwrap();
        assert!(MonotonicClock.next() > stored);
    }

    #[test]
    fn test_filter_skips_mutations() {
        let db = Db::memory();
        let input = db.sublevel("input");
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let _trigger = Trigger::watch(
            "puts-only",
            &input,
            &db.sublevel("puts-only#backlog"),
            Some(Box::new(|_key: &[u8], value: Option<&[u8]>| value.is_some())),
            move |_: &Mutation| -> Result<()> {
                counter.set(counter.get() + 1);
                Ok(())
            },
            TriggerOptions::new(),
        )
        .unwrap();

        input.put(b"a", b"1").unwrap();
        input.delete(b"a").unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_reentrant_write_is_redelivered() {
        let db = Db::memory();
        let input = db.sublevel("input");
        let writer = input.clone();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _trigger = Trigger::watch(
            "bump",
            &input,
            &db.sublevel("bump#backlog"),
            None,
            move |m: &Mutation| -> Result<()> {
                sink.borrow_mut().push(m.clone());
                if m.value.as_deref() == Some(b"1".as_slice()) {
                    writer.put(&m.key, b"2")?;
                }
                Ok(())
            },
            TriggerOptions::new(),
        )
        .unwrap();

        input.put(b"k", b"1").unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Mutation::put(b"k".as_slice(), b"1".as_slice()),
                Mutation::put(b"k".as_slice(), b"2".as_slice()),
            ]
        );
    }

    #[test]
    fn test_close_stops_delivery() {
        let db = Db::memory();
        let (trigger, log) = recording_trigger(&db, TriggerOptions::new());
        trigger.close();
        assert!(trigger.is_closed());
        assert_eq!(db.hook_count(), 0);

        db.sublevel("input").put(b"a", b"1").unwrap();
        assert!(log.borrow().is_empty());
        assert!(matches!(trigger.work_off(), Err(Error::Closed { .. })));
        assert!(matches!(trigger.enqueue(b"a"), Err(Error::Closed { .. })));
    }

    #[test]
    fn test_backfill_existing_records() {
        let db = Db::memory();
        let input = db.sublevel("input");
        input.put(b"x", b"1").unwrap();
        input.put(b"y", b"2").unwrap();

        let (trigger, log) = recording_trigger(&db, TriggerOptions::deferred());
        assert_eq!(trigger.backfill().unwrap(), 2);
        assert_eq!(trigger.work_off().unwrap(), 2);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_watch_rejects_overlapping_backlog() {
        let db = Db::memory();
        let result = Trigger::watch(
            "bad",
            &db.sublevel("input"),
            &db.sublevel("input"),
            None,
            |_: &Mutation| -> Result<()> { Ok(()) },
            TriggerOptions::new(),
        );
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));

        let result = Trigger::watch(
            "bad",
            &db.sublevel("input"),
            &Db::memory().sublevel("backlog"),
            None,
            |_: &Mutation| -> Result<()> { Ok(()) },
            TriggerOptions::new(),
        );
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_dropping_trigger_unregisters() {
        let db = Db::memory();
        {
            let (_trigger, _log) = recording_trigger(&db, TriggerOptions::new());
            assert_eq!(db.hook_count(), 1);
        }
        assert_eq!(db.hook_count(), 0);
    }
}
