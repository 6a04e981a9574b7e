//! Mapfold Reactive - Change triggers for mapfold.
//!
//! This crate implements the trigger framework the indexing tasks are driven
//! by. A trigger watches a source sublevel, persists every observed mutation in
//! a backlog sublevel and delivers it to a handler, either inside the write
//! that produced it or when the host calls `work_off`.
//!
//! # Core Concepts
//!
//! - `Mutation`: A key of the watched range together with its current value
//! - `MutationHandler`: Receiver of mutations; mapping and reduce stages implement it
//! - `Trigger`: Subscription with persisted backlog and at-least-once delivery
//! - `TriggerSet`: Named triggers drained together until quiescent

#![no_std]

extern crate alloc;

pub mod mutation;
pub mod trigger;
pub mod trigger_set;

pub use mutation::{Mutation, MutationHandler};
pub use trigger::{Delivery, FilterFn, Trigger, TriggerOptions, FAILED_SUFFIX};
pub use trigger_set::TriggerSet;
