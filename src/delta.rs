//! Interval deltas of monotonic counters.
//!
//! Counters such as "bytes read since boot" only grow on a healthy system,
//! but device resets and re-enumeration can make them drop. A drop is
//! reported as no activity and the high-water mark is kept, so the counter
//! has to climb past its old peak before activity is measured again.

/// Computes the delta of `current` against `previous` and the new previous value.
///
/// Returns `(current - previous, current)` when the counter advanced and
/// `(0, previous)` otherwise.
pub fn delta(current: u64, previous: u64) -> (u64, u64) {
    if current > previous {
        (current - previous, current)
    } else {
        (0, previous)
    }
}

/// High-water mark of a single monotonic counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTracker {
    high_water: Option<u64>,
}

impl CounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest value observed so far, `None` before the first observation.
    pub fn high_water(&self) -> Option<u64> {
        self.high_water
    }

    /// Delta that [`CounterTracker::observe`] would report, without committing.
    ///
    /// The first observation only seeds the tracker and yields 0.
    pub fn peek(&self, current: u64) -> (u64, u64) {
        match self.high_water {
            None => (0, current),
            Some(previous) => delta(current, previous),
        }
    }

    /// Records `current` and returns the delta since the last high-water mark.
    pub fn observe(&mut self, current: u64) -> u64 {
        let (d, next) = self.peek(current);
        self.high_water = Some(next);
        d
    }
}
