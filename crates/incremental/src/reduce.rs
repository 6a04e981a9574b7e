//! Reduce task: keeps a tree of aggregates over index key prefixes.
//!
//! Every prefix of an index key path owns one reduce node, stored under
//! `encode_prefix(path)` in the target sublevel. A node folds the leaf
//! emissions whose key is exactly `path` with `reduce`, then the nodes one
//! level below it with `rereduce`. When an index key changes, the nodes along
//! its path are recomputed bottom-up, stopping at the configured level.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::marker::PhantomData;
use mapfold_core::{Codec, Error, Result};
use mapfold_index::{codec, Key, RangeIterator};
use mapfold_reactive::{Delivery, Mutation, MutationHandler, Trigger, TriggerOptions};
use mapfold_storage::Sublevel;

use crate::map::BACKLOG_SUFFIX;

/// The fold functions of a reduce task.
///
/// `reduce` only ever sees raw leaf values and `rereduce` only ever sees
/// aggregates of other nodes.
pub trait Reducer {
    /// Aggregate stored in each node.
    type Acc: Codec;
    /// Value of a leaf emission.
    type Leaf: Codec;

    /// Returns a fresh, empty aggregate.
    fn init(&self) -> Self::Acc;

    /// Folds one leaf value into `acc`.
    fn reduce(&self, acc: Self::Acc, leaf: Self::Leaf) -> Self::Acc;

    /// Folds the aggregate of a child node into `acc`.
    fn rereduce(&self, acc: Self::Acc, child: Self::Acc) -> Self::Acc;
}

/// A `Reducer` built from three closures.
pub struct FnReducer<A, L, F, G, V> {
    reduce_fn: F,
    rereduce_fn: G,
    value_factory: V,
    _types: PhantomData<fn(L) -> A>,
}

impl<A, L, F, G, V> FnReducer<A, L, F, G, V>
where
    F: Fn(A, L) -> A,
    G: Fn(A, A) -> A,
    V: Fn() -> A,
{
    pub fn new(reduce_fn: F, rereduce_fn: G, value_factory: V) -> Self {
        Self {
            reduce_fn,
            rereduce_fn,
            value_factory,
            _types: PhantomData,
        }
    }
}

impl<A, L, F, G, V> Reducer for FnReducer<A, L, F, G, V>
where
    A: Codec,
    L: Codec,
    F: Fn(A, L) -> A,
    G: Fn(A, A) -> A,
    V: Fn() -> A,
{
    type Acc = A;
    type Leaf = L;

    fn init(&self) -> A {
        (self.value_factory)()
    }

    fn reduce(&self, acc: A, leaf: L) -> A {
        (self.reduce_fn)(acc, leaf)
    }

    fn rereduce(&self, acc: A, child: A) -> A {
        (self.rereduce_fn)(acc, child)
    }
}

/// Computes the aggregate of a single reduce node.
pub trait NodeFolder<R: Reducer> {
    /// Returns the aggregate of the node at `path`, reading leaf emissions
    /// from `index` and child nodes from `nodes`.
    fn fold(
        &self,
        reducer: &R,
        index: &Sublevel,
        nodes: &Sublevel,
        path: &[Vec<u8>],
    ) -> Result<R::Acc>;
}

/// Rescans every leaf and child of the node on each recompute.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullRescan;

impl<R: Reducer> NodeFolder<R> for FullRescan {
    fn fold(
        &self,
        reducer: &R,
        index: &Sublevel,
        nodes: &Sublevel,
        path: &[Vec<u8>],
    ) -> Result<R::Acc> {
        let mut acc = reducer.init();

        // Null-key emissions belong to no node.
        let mut leaves = 0usize;
        if !path.is_empty() {
            let mut iter = RangeIterator::over(index, &codec::encode_prefix(path)?);
            iter.seek_first();
            while iter.valid() {
                acc = reducer.reduce(acc, R::Leaf::decode(iter.value())?);
                leaves += 1;
                iter.next();
            }
        }

        let mut children = 0usize;
        let mut iter = RangeIterator::over(nodes, &codec::join_prefix(path, true)?).with_suffix(0);
        iter.seek_first();
        while iter.valid() {
            acc = reducer.rereduce(acc, R::Acc::decode(iter.value())?);
            children += 1;
            iter.next();
        }

        tracing::debug!(level = path.len(), leaves, children, "reduce node recomputed");
        Ok(acc)
    }
}

/// The per-mutation half of a reduce task.
pub struct ReduceStage<R, N = FullRescan> {
    name: String,
    index: Sublevel,
    nodes: Sublevel,
    reducer: R,
    folder: N,
    level: usize,
}

impl<R, N> ReduceStage<R, N>
where
    R: Reducer,
    N: NodeFolder<R>,
{
    /// Creates a stage folding `index` into `nodes` down to `level`.
    pub fn new(
        name: &str,
        index: &Sublevel,
        nodes: &Sublevel,
        reducer: R,
        folder: N,
        level: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            index: index.clone(),
            nodes: nodes.clone(),
            reducer,
            folder,
            level,
        }
    }

    /// Recomputes and stores every node on `path` from its full depth up to
    /// the configured level.
    pub fn refresh(&self, path: &[Vec<u8>]) -> Result<()> {
        if self.level > path.len() {
            return Ok(());
        }
        for depth in (self.level..=path.len()).rev() {
            let prefix = &path[..depth];
            let acc = self.folder.fold(&self.reducer, &self.index, &self.nodes, prefix)?;
            self.nodes.put(&codec::encode_prefix(prefix)?, &acc.encode()?)?;
        }
        Ok(())
    }
}

impl<R, N> MutationHandler for ReduceStage<R, N>
where
    R: Reducer,
    N: NodeFolder<R>,
{
    fn handle(&mut self, mutation: &Mutation) -> Result<()> {
        let (path, _) = codec::decode(&mutation.key).map_err(|err| {
            tracing::error!(task = %self.name, error = %err, "undecodable index key");
            Error::corruption(mutation.key.clone(), format!("not an index key: {}", err))
        })?;
        tracing::debug!(task = %self.name, depth = path.len(), level = self.level, "reducing path");
        self.refresh(&path)
    }
}

/// Configures and starts a `ReduceTask`.
pub struct ReduceTaskBuilder<N = FullRescan> {
    source: Sublevel,
    target: Sublevel,
    name: String,
    level: usize,
    delivery: Delivery,
    folder: N,
}

impl ReduceTaskBuilder {
    /// Creates a builder reducing the index `source` into `target`.
    pub fn new(source: &Sublevel, target: &Sublevel, name: &str) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            name: name.to_string(),
            level: 0,
            delivery: Delivery::Immediate,
            folder: FullRescan,
        }
    }
}

impl<N> ReduceTaskBuilder<N> {
    /// Sets the shallowest depth that is recomputed. 0 maintains the root.
    pub fn level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Sets when index mutations are processed.
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Replaces the node folding strategy.
    pub fn folder<M>(self, folder: M) -> ReduceTaskBuilder<M> {
        ReduceTaskBuilder {
            source: self.source,
            target: self.target,
            name: self.name,
            level: self.level,
            delivery: self.delivery,
            folder,
        }
    }

    /// Starts the task.
    pub fn build<R>(self, reducer: R) -> Result<ReduceTask<R>>
    where
        R: Reducer + 'static,
        N: NodeFolder<R> + 'static,
    {
        if self.source.db().same_store(self.target.db())
            && self.source.prefix() == self.target.prefix()
        {
            return Err(Error::invalid_operation("reduce target must differ from its index"));
        }
        let backlog = self.source.sibling(&format!("{}{}", self.name, BACKLOG_SUFFIX));
        let stage = ReduceStage::new(
            &self.name,
            &self.source,
            &self.target,
            reducer,
            self.folder,
            self.level,
        );
        let trigger = Trigger::watch(
            &self.name,
            &self.source,
            &backlog,
            None,
            stage,
            TriggerOptions::new().delivery(self.delivery),
        )?;

        Ok(ReduceTask {
            name: self.name,
            nodes: self.target,
            level: self.level,
            trigger,
            _reducer: PhantomData,
        })
    }
}

/// A running reduce task.
pub struct ReduceTask<R: Reducer> {
    name: String,
    nodes: Sublevel,
    level: usize,
    trigger: Trigger,
    _reducer: PhantomData<fn() -> R>,
}

impl<A, L, F, G, V> ReduceTask<FnReducer<A, L, F, G, V>>
where
    A: Codec + 'static,
    L: Codec + 'static,
    F: Fn(A, L) -> A + 'static,
    G: Fn(A, A) -> A + 'static,
    V: Fn() -> A + 'static,
{
    /// Starts reducing the index `source` into `target` with immediate
    /// delivery.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mapfold_incremental::{MapTask, ReduceTask};
    /// use mapfold_storage::Db;
    ///
    /// let db = Db::memory();
    /// let input = db.sublevel("input");
    /// let index = db.sublevel("index");
    /// let _map = MapTask::new(&input, &index, "by-kind", |_, value, emit| {
    ///     emit.emit_raw(value, b"")
    /// })
    /// .unwrap();
    /// let counts = ReduceTask::new(
    ///     &index,
    ///     &db.sublevel("counts"),
    ///     "count",
    ///     |acc: u64, _: Vec<u8>| acc + 1,
    ///     |acc: u64, child: u64| acc + child,
    ///     || 0u64,
    ///     0,
    /// )
    /// .unwrap();
    ///
    /// input.put(b"Bella Vista", b"Pizza").unwrap();
    /// input.put(b"Maria", b"Pizza").unwrap();
    /// input.put(b"Tokio", b"Sushi").unwrap();
    /// assert_eq!(counts.get_value("Pizza").unwrap(), Some(2));
    /// assert_eq!(counts.get_value(()).unwrap(), Some(3));
    /// ```
    pub fn new(
        source: &Sublevel,
        target: &Sublevel,
        name: &str,
        reduce_fn: F,
        rereduce_fn: G,
        value_factory: V,
        level: usize,
    ) -> Result<Self> {
        ReduceTaskBuilder::new(source, target, name)
            .level(level)
            .build(FnReducer::new(reduce_fn, rereduce_fn, value_factory))
    }
}

impl<R: Reducer> ReduceTask<R> {
    /// Returns the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shallowest maintained depth.
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Returns the sublevel holding the reduce nodes.
    #[inline]
    pub fn nodes(&self) -> &Sublevel {
        &self.nodes
    }

    /// Returns the underlying trigger.
    #[inline]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Returns the serialized aggregate of the node at `prefix`.
    pub fn get(&self, prefix: impl Into<Key>) -> Result<Option<Vec<u8>>> {
        self.nodes.get(&prefix.into().encode_prefix()?)
    }

    /// Returns the decoded aggregate of the node at `prefix`.
    pub fn get_value(&self, prefix: impl Into<Key>) -> Result<Option<R::Acc>> {
        self.get(prefix)?.map(|bytes| R::Acc::decode(&bytes)).transpose()
    }

    /// Iterates the nodes one level below `prefix`, in key order.
    pub fn iter(&self, prefix: impl Into<Key>) -> Result<RangeIterator> {
        let key = prefix.into();
        let children = codec::join_prefix(&key.components(), true)?;
        Ok(RangeIterator::over(&self.nodes, &children).with_suffix(0))
    }

    /// Processes every pending index mutation. Returns how many were processed.
    pub fn work_off(&self) -> Result<usize> {
        self.trigger.work_off()
    }

    /// Returns the number of index mutations waiting to be processed.
    pub fn pending(&self) -> Result<usize> {
        self.trigger.pending()
    }

    /// Stops processing. Pending mutations stay recorded.
    pub fn close(&self) {
        self.trigger.close();
    }
}

impl<R: Reducer> core::fmt::Debug for ReduceTask<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReduceTask")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("trigger", &self.trigger)
            .finish()
    }
}
