//! Mapfold Core - Shared building blocks for the mapfold indexing engine.
//!
//! This crate provides the types every other mapfold crate depends on:
//!
//! - `Error`: Error taxonomy (transient storage failures, fatal corruption, usage errors)
//! - `Clock`: Injected sequence-number provider used to disambiguate emissions
//! - `Codec`: Explicit serialization capability for emitted values and aggregates
//!
//! # Example
//!
//! ```rust
//! use mapfold_core::{Clock, Codec, Json, ManualClock};
//!
//! let clock = ManualClock::new(10);
//! assert_eq!(clock.next(), 10);
//! assert_eq!(clock.next(), 11);
//!
//! let bytes = Json(vec![1u32, 2, 3]).encode().unwrap();
//! assert_eq!(bytes, b"[1,2,3]");
//! let Json(back) = Json::<Vec<u32>>::decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

#![no_std]

extern crate alloc;

mod clock;
mod codec;
mod error;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use codec::{Codec, Json};
pub use error::{Error, Result};
