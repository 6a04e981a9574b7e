//! Mapfold Index - Composite keys and prefix-scoped index iteration.
//!
//! This crate provides:
//!
//! - `Key`: The component shapes a map function may emit
//! - `codec`: Order-preserving encoding of component tuples plus a sequence number
//! - `RangeIterator`: A cursor restricted to one key prefix that hides the
//!   namespace prefix and the sequence suffix
//!
//! # Example
//!
//! ```rust
//! use mapfold_index::{codec, Key, RangeIterator};
//! use mapfold_storage::Db;
//!
//! let db = Db::memory();
//! let index = db.sublevel("index");
//! for (seq, dish) in [(1u64, "Sushi"), (2, "Forelle Blau")] {
//!     let key = Key::from("Fish").encode(seq).unwrap();
//!     index.put(&key, dish.as_bytes()).unwrap();
//! }
//! index.put(&Key::from("Pig").encode(3).unwrap(), b"Pulled Pork").unwrap();
//!
//! let prefix = codec::encode_prefix(&["Fish"]).unwrap();
//! let dishes: Vec<_> = RangeIterator::over(&index, &prefix)
//!     .entries()
//!     .map(|(_, dish)| dish)
//!     .collect();
//! assert_eq!(dishes, vec![b"Sushi".to_vec(), b"Forelle Blau".to_vec()]);
//! ```

#![no_std]

extern crate alloc;

pub mod codec;
pub mod iter;
pub mod key;

pub use codec::{
    decode, decode_prefix, encode, encode_prefix, join_prefix, split_seq, MAX_COMPONENTS,
    SEPARATOR, SEQ_WIDTH,
};
pub use iter::{Entries, RangeIterator};
pub use key::Key;
