//! Groups of triggers drained together.
//!
//! A mapping task feeding a reduce task forms a cascade: draining the first
//! trigger writes into the range the second one watches. With deferred
//! delivery the host drains the whole set until it is quiescent.

use crate::trigger::Trigger;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use mapfold_core::Result;

/// Named triggers drained as one unit.
#[derive(Default)]
pub struct TriggerSet {
    triggers: HashMap<String, Trigger>,
}

impl TriggerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            triggers: HashMap::new(),
        }
    }

    /// Adds a trigger under its name, returning any trigger it replaced.
    pub fn insert(&mut self, trigger: Trigger) -> Option<Trigger> {
        self.triggers.insert(trigger.name().to_string(), trigger)
    }

    /// Removes a trigger by name.
    pub fn remove(&mut self, name: &str) -> Option<Trigger> {
        self.triggers.remove(name)
    }

    /// Returns a trigger by name.
    pub fn get(&self, name: &str) -> Option<&Trigger> {
        self.triggers.get(name)
    }

    /// Returns the number of triggers.
    #[inline]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Returns true if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Returns the sorted trigger names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.triggers.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Drains every open trigger repeatedly until a full round delivers
    /// nothing. Returns the total number of delivered mutations.
    pub fn work_off(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let mut round = 0;
            for name in self.names() {
                let trigger = &self.triggers[name];
                if !trigger.is_closed() {
                    round += trigger.work_off()?;
                }
            }
            if round == 0 {
                return Ok(total);
            }
            total += round;
        }
    }

    /// Returns the number of pending mutations across all triggers.
    pub fn pending(&self) -> Result<usize> {
        let mut total = 0;
        for trigger in self.triggers.values() {
            total += trigger.pending()?;
        }
        Ok(total)
    }

    /// Closes every trigger and empties the set.
    pub fn close(&mut self) {
        for trigger in self.triggers.values() {
            trigger.close();
        }
        self.triggers.clear();
    }
}
