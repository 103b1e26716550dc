//! Derived indices over the message store
//!
//! Both structures are caches over the ring buffer's live range: they are
//! maintained incrementally on insert/evict and rebuilt wholesale whenever
//! slots are relocated (growth or defragmentation). Every entry's slot
//! value must stay within the live range `[head, tail)`; readers defend
//! against staleness anyway.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Map from message identifier to its current slot position
///
/// Disabled indexing turns this into a no-op shell: lookups miss and
/// duplicate identifiers go undetected, matching the configuration
/// contract that indexing is what pays for those guarantees.
#[derive(Debug)]
pub(super) struct IdIndex {
    enabled: bool,
    map: HashMap<String, usize>,
}

impl IdIndex {
    pub(super) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            map: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(super) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub(super) fn get(&self, id: &str) -> Option<usize> {
        self.map.get(id).copied()
    }

    pub(super) fn insert(&mut self, id: &str, slot: usize) {
        if self.enabled {
            self.map.insert(id.to_string(), slot);
        }
    }

    pub(super) fn remove(&mut self, id: &str) {
        self.map.remove(id);
    }

    pub(super) fn clear(&mut self) {
        self.map.clear();
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Map from minute-granularity time bucket to slot positions
///
/// Accelerates "first message at or after cutoff" resolution: buckets
/// strictly before the cutoff minute can only hold expired messages, so a
/// scan may start at the smallest slot in any qualifying bucket instead of
/// at `head`. Stale buckets are pruned opportunistically during compaction.
#[derive(Debug, Default)]
pub(super) struct TimeIndex {
    buckets: HashMap<i64, Vec<usize>>,
}

impl TimeIndex {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Bucket key for a timestamp: unix seconds grouped by minute
    pub(super) fn bucket_of(timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp().div_euclid(60)
    }

    pub(super) fn insert(&mut self, timestamp: DateTime<Utc>, slot: usize) {
        self.buckets
            .entry(Self::bucket_of(timestamp))
            .or_default()
            .push(slot);
    }

    /// Drop every bucket with a key strictly below `bucket`
    pub(super) fn prune_before(&mut self, bucket: i64) {
        self.buckets.retain(|key, _| *key >= bucket);
    }

    /// Smallest live slot in any bucket at or after `bucket`
    ///
    /// Entries below `min_slot` are evicted leftovers and are ignored.
    pub(super) fn first_slot_at_or_after(&self, bucket: i64, min_slot: usize) -> Option<usize> {
        self.buckets
            .iter()
            .filter(|(key, _)| **key >= bucket)
            .flat_map(|(_, slots)| slots.iter().copied())
            .filter(|slot| *slot >= min_slot)
            .min()
    }

    pub(super) fn clear(&mut self) {
        self.buckets.clear();
    }

    #[cfg(test)]
    pub(super) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
