//! Growable, reusable array of fixed-size page records
//!
//! A `RecordSet` keeps its allocation across `reset()` so that consecutive
//! epochs reuse the storage reached by the busiest epoch so far.

use std::ops::Index;

const MIN_CAPACITY: usize = 16;

/// Array of records with whole-set reset and no interior removal.
#[derive(Debug, Clone)]
pub struct RecordSet<T> {
    records: Vec<T>,
}

impl<T> RecordSet<T> {
    /// Create an empty set without allocating.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Create a set with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Append a record and return its slot index.
    ///
    /// Capacity doubles when the set is full.
    pub fn append(&mut self, record: T) -> usize {
        if self.records.len() == self.records.capacity() {
            let grow_by = self.records.capacity().max(MIN_CAPACITY);
            self.records.reserve_exact(grow_by);
        }
        let slot = self.records.len();
        self.records.push(record);
        slot
    }

    /// Drop every record, keeping the backing storage.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Number of records appended since the last reset
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records the set can hold without reallocating
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Record at `index`.
    ///
    /// # Panics
    /// Panics if `index >= len()`. Use [`RecordSet::get`] when the index is untrusted.
    #[inline]
    pub fn at(&self, index: usize) -> &T {
        &self.records[index]
    }

    /// Mutable record at `index`.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> &mut T {
        &mut self.records[index]
    }

    /// Record at `index`, if in range
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.records.get(index)
    }

    /// Mutable record at `index`, if in range
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.records.get_mut(index)
    }

    /// Records as a slice, in append order
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    /// Iterate in append order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    /// Append every record from `records`, all or nothing.
    ///
    /// Storage is reserved up front so a failure can only be an allocation
    /// abort, never a partially extended set.
    pub fn extend_from_vec(&mut self, records: Vec<T>) {
        let needed = self.records.len() + records.len();
        if needed > self.records.capacity() {
            let target = needed.max(self.records.capacity() * 2).max(MIN_CAPACITY);
            self.records.reserve_exact(target - self.records.len());
        }
        self.records.extend(records);
    }
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for RecordSet<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.at(index)
    }
}

impl<'a, T> IntoIterator for &'a RecordSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_returns_slot() {
        let mut set = RecordSet::new();
        assert_eq!(set.append(10u32), 0);
        assert_eq!(set.append(20u32), 1);
        assert_eq!(*set.at(1), 20);
        assert_eq!(set[0], 10);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_geometric_growth() {
        let mut set = RecordSet::new();
        let mut growths = 0;
        let mut last_cap = set.capacity();
        for i in 0..10_000u64 {
            set.append(i);
            if set.capacity() != last_cap {
                growths += 1;
                last_cap = set.capacity();
            }
        }
        assert_eq!(set.len(), 10_000);
        // Doubling from 16 reaches 10k in about ten steps.
        assert!(growths <= 12, "grew {growths} times");
    }

    #[test]
    fn test_reset_keeps_peak_capacity() {
        let mut set = RecordSet::new();
        for i in 0..1000u32 {
            set.append(i);
        }
        let peak = set.capacity();
        set.reset();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), peak);
        for i in 0..10u32 {
            set.append(i);
        }
        assert_eq!(set.len(), 10);
        assert_eq!(set.capacity(), peak);
    }

    #[test]
    fn test_get_out_of_range() {
        let mut set = RecordSet::new();
        set.append(1u8);
        assert!(set.get(1).is_none());
        assert_eq!(set.get(0), Some(&1));
    }

    #[test]
    #[should_panic]
    fn test_at_out_of_range_panics() {
        let set: RecordSet<u8> = RecordSet::new();
        let _ = set.at(0);
    }

    #[test]
    fn test_extend_from_vec() {
        let mut set = RecordSet::new();
        set.append(0u16);
        set.extend_from_vec(vec![1, 2, 3]);
        assert_eq!(set.as_slice(), &[0, 1, 2, 3]);
    }
}
