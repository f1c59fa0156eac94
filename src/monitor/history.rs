//! Bounded sample history.

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Default number of samples retained.
pub const DEFAULT_CAPACITY: usize = 200;

/// Fixed-capacity sequence of samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingHistory {
    /// Creates an empty history holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest at capacity.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Iterates oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Samples as a vector, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Serialize for RollingHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.samples.iter())
    }
}

impl Extend<f64> for RollingHistory {
    fn extend<T: IntoIterator<Item = f64>>(&mut self, iter: T) {
        for value in iter {
            self.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut history = RollingHistory::with_capacity(3);
        history.extend([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(history.to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.latest(), Some(4.0));
    }

    #[test]
    fn test_default_capacity() {
        let mut history = RollingHistory::default();
        history.extend((0..250).map(|i| i as f64));
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.iter().next(), Some(50.0));
    }

    #[test]
    fn test_serializes_as_sequence() {
        let mut history = RollingHistory::with_capacity(2);
        history.extend([0.5, 0.25]);
        assert_eq!(serde_json::to_string(&history).unwrap(), "[0.5,0.25]");
    }
}
