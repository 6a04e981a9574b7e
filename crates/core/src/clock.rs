//! Sequence-number providers.
//!
//! Every emission written by a mapping task carries a sequence number so that
//! two emissions with the same logical key never collide as stored keys. The
//! provider is injected into tasks; `MonotonicClock` is the process-wide
//! default and `ManualClock` is a deterministic stand-in for tests.

use core::sync::atomic::{AtomicU64, Ordering};

/// A source of strictly increasing sequence numbers.
pub trait Clock {
    /// Returns the next sequence number. Each call returns a value greater
    /// than every value previously returned by this clock.
    fn next(&self) -> u64;

    /// Advances the clock so that it never returns a value at or below
    /// `tick`. Never moves it backwards.
    fn observe(&self, tick: u64);
}

/// Global sequence counter shared by every `MonotonicClock`.
static NEXT_TICK: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic clock. Safe to call concurrently.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Creates a handle to the process-wide clock.
    pub fn new() -> Self {
        MonotonicClock
    }
}

impl Clock for MonotonicClock {
    fn next(&self) -> u64 {
        NEXT_TICK.fetch_add(1, Ordering::SeqCst)
    }

    fn observe(&self, tick: u64) {
        NEXT_TICK.fetch_max(tick.saturating_add(1), Ordering::SeqCst);
    }
}

/// A clock starting at a caller-controlled value.
#[derive(Debug)]
pub struct ManualClock {
    next: AtomicU64,
}

impl ManualClock {
    /// Creates a clock whose first tick is `start`.
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Returns the tick the next call to `next` will produce.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    fn observe(&self, tick: u64) {
        self.next.fetch_max(tick.saturating_add(1), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_increases() {
        let clock = MonotonicClock::new();
        let a = clock.next();
        let b = clock.next();
        let c = MonotonicClock.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_monotonic_clock_observe() {
        let clock = MonotonicClock::new();
        let current = clock.next();
        clock.observe(current + 1000);
        assert!(clock.next() > current + 1000);

        // Observing an old tick never moves the clock backwards.
        clock.observe(0);
        assert!(clock.next() > current + 1000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(42);
        assert_eq!(clock.peek(), 42);
        assert_eq!(clock.next(), 42);
        assert_eq!(clock.next(), 43);
        assert_eq!(clock.peek(), 44);

        clock.observe(99);
        assert_eq!(clock.next(), 100);
        clock.observe(7);
        assert_eq!(clock.next(), 101);
    }

    #[test]
    fn test_clock_as_trait_object() {
        let clock: &dyn Clock = &ManualClock::default();
        assert_eq!(clock.next(), 0);
        assert_eq!(clock.next(), 1);
    }
}
