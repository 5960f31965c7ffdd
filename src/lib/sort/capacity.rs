//! Capacity policy for the sliding sort buffer.
//!
//! The policy is a small state machine over a current capacity. All thresholds
//! are derived from the current capacity and recomputed whenever it changes:
//!
//! | threshold | value                         |
//! |-----------|-------------------------------|
//! | grow      | 90% of capacity               |
//! | shrink    | 50% of capacity, at least 1   |
//! | check     | 1% of capacity, at least 1    |
//!
//! After each eviction the buffer reports its pending count through
//! [`CapacityPolicy::adjust`]: above the grow threshold the capacity grows by one
//! base unit; below the shrink threshold (and above base) it drops back to base.

/// Outcome of a call to [`CapacityPolicy::adjust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityChange {
    /// Capacity is unchanged.
    Unchanged,
    /// Capacity grew by one base unit to the contained value.
    Grew(usize),
    /// Capacity returned to the base value.
    Shrank(usize),
}

/// Grow/shrink policy derived from a base capacity.
#[derive(Debug, Clone)]
pub struct CapacityPolicy {
    base: usize,
    capacity: usize,
    grow_threshold: usize,
    shrink_threshold: usize,
    check_interval: usize,
}

impl CapacityPolicy {
    /// Creates a policy whose capacity starts at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is zero.
    #[must_use]
    pub fn new(base: usize) -> Self {
        assert!(base > 0, "base capacity must be > 0");
        let mut policy = Self {
            base,
            capacity: base,
            grow_threshold: 0,
            shrink_threshold: 0,
            check_interval: 0,
        };
        policy.recompute();
        policy
    }

    fn recompute(&mut self) {
        self.grow_threshold = self.capacity / 10 * 9 + self.capacity % 10 * 9 / 10;
        self.shrink_threshold = (self.capacity / 2).max(1);
        self.check_interval = (self.capacity / 100).max(1);
    }

    /// The base capacity.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// The current capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending count above which capacity grows.
    #[must_use]
    pub fn grow_threshold(&self) -> usize {
        self.grow_threshold
    }

    /// Pending count below which capacity returns to base.
    #[must_use]
    pub fn shrink_threshold(&self) -> usize {
        self.shrink_threshold
    }

    /// Number of additions between eviction checks.
    #[must_use]
    pub fn check_interval(&self) -> usize {
        self.check_interval
    }

    /// Grows capacity by one base unit.
    pub fn grow(&mut self) {
        self.capacity = self.capacity.saturating_add(self.base);
        self.recompute();
    }

    /// Returns capacity to the base value.
    pub fn reset(&mut self) {
        self.capacity = self.base;
        self.recompute();
    }

    /// Applies the grow/shrink rule for the given pending count.
    pub fn adjust(&mut self, pending: usize) -> CapacityChange {
        if pending > self.grow_threshold {
            self.grow();
            CapacityChange::Grew(self.capacity)
        } else if self.capacity > self.base && pending < self.shrink_threshold {
            self.reset();
            CapacityChange::Shrank(self.capacity)
        } else {
            CapacityChange::Unchanged
        }
    }
}
