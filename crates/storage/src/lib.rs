//! Mapfold Storage - Ordered key-value store layer for mapfold.
//!
//! This crate provides the storage collaborators the indexing engine runs on:
//!
//! - `KvStore` / `Cursor`: The ordered byte store contract
//! - `WriteBatch`: Ordered batched writes
//! - `MemoryStore`: Copy-on-write in-memory implementation
//! - `Db`: Shared physical handle that notifies `MutationHook`s of committed writes
//! - `Sublevel`: Logical key range inside a `Db`
//!
//! # Example
//!
//! ```rust
//! use mapfold_storage::Db;
//!
//! let db = Db::memory();
//! let input = db.sublevel("input");
//! input.put(b"Sushi", b"Fish,Rice").unwrap();
//!
//! assert_eq!(input.get(b"Sushi").unwrap(), Some(b"Fish,Rice".to_vec()));
//! assert_eq!(db.get(b"input\x00Sushi").unwrap(), Some(b"Fish,Rice".to_vec()));
//! ```

#![no_std]

extern crate alloc;

pub mod db;
pub mod memory;
pub mod store;
pub mod sublevel;

pub use db::{Db, HookId, MutationHook};
pub use memory::{MemoryCursor, MemoryStore};
pub use store::{BatchOp, Cursor, KvStore, WriteBatch};
pub use sublevel::{Sublevel, SUBLEVEL_SEPARATOR};
