//! Mapping task: keeps a secondary index in sync with a source sublevel.
//!
//! For every source key the task remembers, in a ledger sublevel, the stored
//! index keys written by the most recent map invocation. A mutation writes
//! the new emissions first and retracts the ledgered ones afterwards, in one
//! ordered batch, so a reader may briefly see old and new emissions side by
//! side but never neither.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use mapfold_core::{Clock, Codec, Error, MonotonicClock, Result};
use mapfold_index::{codec, Key, RangeIterator};
use mapfold_reactive::{Delivery, Mutation, MutationHandler, Trigger, TriggerOptions};
use mapfold_storage::{Sublevel, WriteBatch};

/// Suffix of the ledger sublevel name.
pub const LEDGER_SUFFIX: &str = "#ledger";

/// Suffix of the trigger backlog sublevel name.
pub const BACKLOG_SUFFIX: &str = "#backlog";

/// Width of the length header in front of each ledgered key.
const LEN_WIDTH: usize = 4;

/// Collects the emissions of one map invocation.
pub struct Emitter<'a> {
    task: &'a str,
    clock: &'a dyn Clock,
    target: &'a Sublevel,
    batch: WriteBatch,
    entry: Vec<u8>,
    emitted: usize,
}

impl<'a> Emitter<'a> {
    fn new(task: &'a str, clock: &'a dyn Clock, target: &'a Sublevel) -> Self {
        Self {
            task,
            clock,
            target,
            batch: WriteBatch::new(),
            entry: Vec::new(),
            emitted: 0,
        }
    }

    /// Emits `value` under `key`.
    pub fn emit<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: Into<Key>,
        V: Codec,
    {
        let value = value.encode()?;
        self.emit_raw(key, &value)
    }

    /// Emits an already serialized value under `key`.
    pub fn emit_raw<K: Into<Key>>(&mut self, key: K, value: &[u8]) -> Result<()> {
        let seq = self.clock.next();
        let stored = key.into().encode(seq)?;
        let len = u32::try_from(stored.len())
            .map_err(|_| Error::key_encoding("encoded key does not fit a ledger entry"))?;

        self.target.batch_put(&mut self.batch, &stored, value);
        self.entry.extend_from_slice(&len.to_be_bytes());
        self.entry.extend_from_slice(&stored);
        self.emitted += 1;
        tracing::trace!(task = %self.task, seq, "emission written");
        Ok(())
    }

    /// Returns the number of emissions so far.
    #[inline]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// Splits a ledger entry into the stored index keys it lists.
///
/// `key` is the source key the entry belongs to and is only used for error
/// reporting.
pub fn ledger_keys<'a>(key: &[u8], entry: &'a [u8]) -> Result<Vec<&'a [u8]>> {
    let mut keys = Vec::new();
    let mut rest = entry;
    while !rest.is_empty() {
        if rest.len() < LEN_WIDTH {
            return Err(Error::corruption(
                key,
                format!("{} trailing bytes do not form a length header", rest.len()),
            ));
        }
        let (header, tail) = rest.split_at(LEN_WIDTH);
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > tail.len() {
            return Err(Error::corruption(
                key,
                format!("length {} runs past the {} remaining bytes", len, tail.len()),
            ));
        }
        let (stored, tail) = tail.split_at(len);
        keys.push(stored);
        rest = tail;
    }
    Ok(keys)
}

/// The per-mutation half of a mapping task.
///
/// Implements `MutationHandler`, so it can be watched by a trigger or fed
/// mutations directly.
pub struct MapStage<F> {
    name: String,
    target: Sublevel,
    ledger: Sublevel,
    clock: Rc<dyn Clock>,
    map_fn: F,
}

impl<F> MapStage<F>
where
    F: FnMut(&[u8], &[u8], &mut Emitter<'_>) -> Result<()>,
{
    /// Creates a stage writing to `target`, with its ledger in `ledger`.
    /// Both must live on the same physical database.
    pub fn new(
        name: &str,
        target: &Sublevel,
        ledger: &Sublevel,
        clock: Rc<dyn Clock>,
        map_fn: F,
    ) -> Result<Self> {
        if !target.db().same_store(ledger.db()) {
            return Err(Error::invalid_operation("ledger must share the index database"));
        }
        Ok(Self {
            name: name.to_string(),
            target: target.clone(),
            ledger: ledger.clone(),
            clock,
            map_fn,
        })
    }

    /// Returns the index sublevel.
    #[inline]
    pub fn target(&self) -> &Sublevel {
        &self.target
    }

    /// Returns the ledger sublevel.
    #[inline]
    pub fn ledger(&self) -> &Sublevel {
        &self.ledger
    }
}

impl<F> MutationHandler for MapStage<F>
where
    F: FnMut(&[u8], &[u8], &mut Emitter<'_>) -> Result<()>,
{
    fn handle(&mut self, mutation: &Mutation) -> Result<()> {
        let mut emitter = Emitter::new(&self.name, self.clock.as_ref(), &self.target);
        if let Some(value) = &mutation.value {
            (self.map_fn)(&mutation.key, value, &mut emitter)?;
        }
        let Emitter {
            mut batch,
            entry,
            emitted,
            ..
        } = emitter;

        // A failed read leaves index and ledger untouched for this key.
        let previous = self.ledger.get(&mutation.key)?;
        let mut retracted = 0;
        if let Some(previous) = &previous {
            let stale = ledger_keys(&mutation.key, previous).inspect_err(|err| {
                tracing::error!(task = %self.name, error = %err, "corrupt ledger entry");
            })?;
            for stored in stale {
                self.target.batch_delete(&mut batch, stored);
                retracted += 1;
                tracing::trace!(task = %self.name, key_len = stored.len(), "emission retracted");
            }
        }

        // A deleted record keeps no ledger entry rather than an empty one.
        if mutation.is_delete() {
            self.ledger.batch_delete(&mut batch, &mutation.key);
        } else {
            self.ledger.batch_put(&mut batch, &mutation.key, &entry);
        }
        self.target.write(batch)?;

        tracing::debug!(task = %self.name, emitted, retracted, "mapped mutation");
        Ok(())
    }
}

/// Returns the highest sequence number stored in the index, if any.
fn last_seq(target: &Sublevel) -> Result<Option<u64>> {
    let mut cursor = target.cursor();
    cursor.seek(target.prefix());
    let mut last = None;
    while cursor.valid() {
        let Some(stored) = target.strip(cursor.key()) else {
            break;
        };
        let (_, seq) = codec::split_seq(stored).map_err(|err| {
            Error::corruption(stored.to_vec(), format!("not an index key: {}", err))
        })?;
        last = last.max(Some(seq));
        cursor.next();
    }
    Ok(last)
}

/// Configures and starts a `MapTask`.
pub struct MapTaskBuilder {
    source: Sublevel,
    target: Sublevel,
    name: String,
    delivery: Delivery,
    clock: Rc<dyn Clock>,
    backfill: bool,
}

impl MapTaskBuilder {
    /// Creates a builder mapping `source` into `target`.
    pub fn new(source: &Sublevel, target: &Sublevel, name: &str) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            name: name.to_string(),
            delivery: Delivery::Immediate,
            clock: Rc::new(MonotonicClock),
            backfill: false,
        }
    }

    /// Sets when mutations are processed.
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the sequence number provider.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Also maps the records already present in the source.
    pub fn backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    /// Starts the task.
    pub fn build<F>(self, map_fn: F) -> Result<MapTask>
    where
        F: FnMut(&[u8], &[u8], &mut Emitter<'_>) -> Result<()> + 'static,
    {
        let ledger = self.target.sibling(&format!("{}{}", self.name, LEDGER_SUFFIX));
        let backlog = self.source.sibling(&format!("{}{}", self.name, BACKLOG_SUFFIX));
        let stage = MapStage::new(&self.name, &self.target, &ledger, self.clock.clone(), map_fn)?;

        // Emissions from an earlier run must never share a sequence number
        // with new ones.
        if let Some(seq) = last_seq(&self.target)? {
            self.clock.observe(seq);
            tracing::debug!(task = %self.name, seq, "resuming after stored emissions");
        }

        let trigger = Trigger::watch(
            &self.name,
            &self.source,
            &backlog,
            None,
            stage,
            TriggerOptions::new().delivery(self.delivery),
        )?;
        if self.backfill {
            trigger.backfill()?;
            if self.delivery == Delivery::Immediate {
                trigger.work_off()?;
            }
        }

        Ok(MapTask {
            name: self.name,
            target: self.target,
            ledger,
            trigger,
        })
    }
}

/// A running mapping task.
pub struct MapTask {
    name: String,
    target: Sublevel,
    ledger: Sublevel,
    trigger: Trigger,
}

impl MapTask {
    /// Starts mapping `source` into `target` with immediate delivery.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mapfold_incremental::MapTask;
    /// use mapfold_storage::Db;
    ///
    /// let db = Db::memory();
    /// let input = db.sublevel("input");
    /// let index = db.sublevel("index");
    ///
    /// let task = MapTask::new(&input, &index, "by-ingredient", |key, value, emit| {
    ///     for ingredient in value.split(|b| *b == b',') {
    ///         emit.emit_raw(ingredient, key)?;
    ///     }
    ///     Ok(())
    /// })
    /// .unwrap();
    ///
    /// input.put(b"Sushi", b"Fish,Rice").unwrap();
    /// let dishes: Vec<_> = task.iter("Fish").unwrap().entries().map(|(_, v)| v).collect();
    /// assert_eq!(dishes, vec![b"Sushi".to_vec()]);
    /// ```
    pub fn new<F>(source: &Sublevel, target: &Sublevel, name: &str, map_fn: F) -> Result<Self>
    where
        F: FnMut(&[u8], &[u8], &mut Emitter<'_>) -> Result<()> + 'static,
    {
        MapTaskBuilder::new(source, target, name).build(map_fn)
    }

    /// Returns a builder for a task mapping `source` into `target`.
    pub fn builder(source: &Sublevel, target: &Sublevel, name: &str) -> MapTaskBuilder {
        MapTaskBuilder::new(source, target, name)
    }

    /// Returns the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index sublevel.
    #[inline]
    pub fn target(&self) -> &Sublevel {
        &self.target
    }

    /// Returns the ledger sublevel.
    #[inline]
    pub fn ledger(&self) -> &Sublevel {
        &self.ledger
    }

    /// Returns the underlying trigger.
    #[inline]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Iterates the emissions whose key has exactly the components of
    /// `prefix`, in emission order.
    ///
    /// Keys with more components are not reached: the component count leads
    /// every stored key, so `["DE"]` does not match `["DE", "Berlin"]`. Use
    /// a reduce task's `iter` to walk deeper levels.
    pub fn iter(&self, prefix: impl Into<Key>) -> Result<RangeIterator> {
        let prefix = prefix.into().encode_prefix()?;
        Ok(RangeIterator::over(&self.target, &prefix))
    }

    /// Iterates every emission in key order.
    pub fn iter_all(&self) -> RangeIterator {
        RangeIterator::over(&self.target, b"")
    }

    /// Processes every pending mutation. Returns how many were processed.
    pub fn work_off(&self) -> Result<usize> {
        self.trigger.work_off()
    }

    /// Returns the number of mutations waiting to be processed.
    pub fn pending(&self) -> Result<usize> {
        self.trigger.pending()
    }

    /// Stops processing. Pending mutations stay recorded.
    pub fn close(&self) {
        self.trigger.close();
    }
}

impl core::fmt::Debug for MapTask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MapTask")
            .field("name", &self.name)
            .field("target", &self.target.name())
            .field("trigger", &self.trigger)
            .finish()
    }
}
