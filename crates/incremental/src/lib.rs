//! Mapfold Incremental - Incrementally maintained secondary indexes and
//! hierarchical aggregates.
//!
//! This crate keeps derived data in sync with a source sublevel without ever
//! rescanning the source. All work happens synchronously inside the write
//! that produced it, or when the host calls `work_off`.
//!
//! # Core Concepts
//!
//! - `MapTask`: Runs a map function on every changed source record, writes
//!   the emissions to an index and retracts the emissions of the previous run
//! - `Emitter`: Handed to the map function to emit `(key, value)` pairs
//! - `ReduceTask`: Maintains one aggregate per index key prefix, folding raw
//!   leaves with `reduce` and finer aggregates with `rereduce`
//! - `Reducer`: The fold functions of a reduce task
//! - `NodeFolder`: Strategy computing a single reduce node; `FullRescan` is
//!   the default
//!
//! # Example
//!
//! ```rust
//! use mapfold_incremental::{MapTask, ReduceTask};
//! use mapfold_storage::Db;
//!
//! let db = Db::memory();
//! let input = db.sublevel("input");
//! let index = db.sublevel("index");
//!
//! // Index every dish by its ingredients.
//! let by_ingredient = MapTask::new(&input, &index, "ingredients", |dish, recipe, emit| {
//!     for ingredient in recipe.split(|b| *b == b',') {
//!         emit.emit_raw(ingredient, dish)?;
//!     }
//!     Ok(())
//! })
//! .unwrap();
//!
//! // Count dishes per ingredient.
//! let counts = ReduceTask::new(
//!     &index,
//!     &db.sublevel("counts"),
//!     "ingredient-counts",
//!     |acc: u64, _dish: Vec<u8>| acc + 1,
//!     |acc: u64, child: u64| acc + child,
//!     || 0u64,
//!     0,
//! )
//! .unwrap();
//!
//! input.put(b"Sushi", b"Fish,Rice").unwrap();
//! input.put(b"Forelle Blau", b"Fish,Potatoes").unwrap();
//!
//! let fish: Vec<_> = by_ingredient
//!     .iter("Fish")
//!     .unwrap()
//!     .entries()
//!     .map(|(_, dish)| dish)
//!     .collect();
//! assert_eq!(fish, vec![b"Sushi".to_vec(), b"Forelle Blau".to_vec()]);
//! assert_eq!(counts.get_value("Fish").unwrap(), Some(2));
//! assert_eq!(counts.get_value(()).unwrap(), Some(4));
//! ```

#![no_std]

extern crate alloc;

pub mod map;
pub mod reduce;

pub use map::{ledger_keys, Emitter, MapStage, MapTask, MapTaskBuilder, BACKLOG_SUFFIX, LEDGER_SUFFIX};
pub use reduce::{
    FnReducer, FullRescan, NodeFolder, ReduceStage, ReduceTask, ReduceTaskBuilder, Reducer,
};
