//! Growable ring buffer backing a single conversation history
//!
//! A fixed-capacity slot array addressed by `head`/`tail` cursors, with a
//! parallel array of cached byte sizes. Removing from the front advances
//! `head` in O(1) per slot; the O(n) procedures (defragmentation, growth)
//! are isolated here and invoked rarely. The derived indices and the
//! memory counter are updated in the same critical section as every slot
//! mutation, always through the single eviction routine.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::MessageRef;

use super::index::{IdIndex, TimeIndex};

/// Backing storage for one history: slots, cursors, indices, counters
///
/// Invariants: `0 <= head <= tail <= capacity`; every slot in
/// `[head, tail)` is live (`Some`) unless explicitly cleared by eviction;
/// `memory_bytes` equals the sum of cached sizes of live slots.
#[derive(Debug)]
pub(super) struct MessageStore {
    /// Slot array; a `None` entry is empty (never written or evicted)
    pub(super) slots: Vec<Option<MessageRef>>,

    /// Cached byte-cost per slot, parallel to `slots`
    pub(super) sizes: Vec<u64>,

    /// First live slot
    pub(super) head: usize,

    /// One past the last live slot
    pub(super) tail: usize,

    /// Identifier index over live slots
    pub(super) id_index: IdIndex,

    /// Minute-bucketed time index over live slots
    pub(super) time_index: TimeIndex,

    /// Sum of cached sizes of live slots
    pub(super) memory_bytes: u64,

    /// Capacity ceiling derived from the count limit, if one is configured
    grow_cap: Option<usize>,
}

impl MessageStore {
    pub(super) fn new(initial_capacity: usize, enable_indexing: bool, max_messages: usize) -> Self {
        let grow_cap = if max_messages > 0 {
            Some(max_messages + max_messages / 10)
        } else {
            None
        };

        Self {
            slots: vec![None; initial_capacity],
            sizes: vec![0; initial_capacity],
            head: 0,
            tail: 0,
            id_index: IdIndex::new(enable_indexing),
            time_index: TimeIndex::new(),
            memory_bytes: 0,
            grow_cap,
        }
    }

    /// Number of live messages
    pub(super) fn len(&self) -> usize {
        self.tail - self.head
    }

    pub(super) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(super) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(super) fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub(super) fn contains_id(&self, id: &str) -> bool {
        self.id_index.contains(id)
    }

    /// Look up a message by identifier, defending against stale entries
    pub(super) fn get_by_id(&self, id: &str) -> Option<&MessageRef> {
        let slot = self.id_index.get(id)?;
        if slot < self.head || slot >= self.tail {
            return None;
        }
        self.slots[slot].as_ref()
    }

    /// Iterate the live range in insertion order
    pub(super) fn iter_live(&self) -> impl Iterator<Item = &MessageRef> {
        self.slots[self.head..self.tail]
            .iter()
            .filter_map(|slot| slot.as_ref())
    }

    /// Write a record at `tail`; the caller must have ensured room
    pub(super) fn push(&mut self, msg: MessageRef, size: u64) {
        let slot = self.tail;
        self.id_index.insert(msg.id(), slot);
        if let Some(meta) = msg.metadata() {
            self.time_index.insert(meta.timestamp, slot);
        }
        self.slots[slot] = Some(msg);
        self.sizes[slot] = size;
        self.tail += 1;
        self.memory_bytes += size;
    }

    /// Clear one slot: memory counter, identifier index, and slot together
    ///
    /// Every removal path funnels through here so the derived structures
    /// can never disagree about what is live.
    pub(super) fn evict_slot(&mut self, slot: usize) {
        self.memory_bytes = self.memory_bytes.saturating_sub(self.sizes[slot]);
        if let Some(msg) = self.slots[slot].take() {
            self.id_index.remove(msg.id());
        }
        self.sizes[slot] = 0;
    }

    /// Evict every slot in `[head, new_head)` and advance the cursor
    pub(super) fn evict_through(&mut self, new_head: usize) {
        for slot in self.head..new_head {
            self.evict_slot(slot);
        }
        self.head = new_head;
    }

    /// First live slot whose timestamp is at or after `cutoff`
    ///
    /// The time index supplies a starting position: buckets strictly
    /// before the cutoff minute can only hold older messages, so slots
    /// before the smallest qualifying entry are already expired (records
    /// without a timestamp count as expired here, as they carry no
    /// evidence of recency). Returns `tail` when everything is older.
    pub(super) fn first_at_or_after(&self, cutoff: DateTime<Utc>) -> usize {
        if self.is_empty() {
            return self.head;
        }

        let start = self
            .time_index
            .first_slot_at_or_after(TimeIndex::bucket_of(cutoff), self.head)
            .unwrap_or(self.tail);

        for slot in start..self.tail {
            if let Some(msg) = &self.slots[slot] {
                if let Some(meta) = msg.metadata() {
                    if meta.timestamp >= cutoff {
                        return slot;
                    }
                }
            }
        }

        self.tail
    }

    /// Make room for `extra` more records at `tail`
    ///
    /// Prefers defragmentation when the live range fits the current
    /// capacity (reclaims trailing space for one copy pass), otherwise
    /// grows the backing arrays. Never drops data.
    pub(super) fn ensure_room_for(&mut self, extra: usize) {
        if self.tail + extra <= self.capacity() {
            return;
        }
        if self.head > 0 && self.len() + extra <= self.capacity() {
            self.defragment();
            return;
        }
        self.grow_for(extra);
    }

    /// Relocate all live slots down to index 0 and rebuild both indices
    pub(super) fn defragment(&mut self) {
        let active = self.len();
        if active == 0 {
            self.head = 0;
            self.tail = 0;
            return;
        }
        if self.head == 0 {
            return;
        }

        debug!(active, head = self.head, "defragmenting history buffer");

        for i in 0..active {
            let src = self.head + i;
            self.slots[i] = self.slots[src].take();
            self.sizes[i] = self.sizes[src];
            self.sizes[src] = 0;
        }

        self.head = 0;
        self.tail = active;
        self.rebuild_indices();
    }

    /// Grow the backing arrays, copying the live range to the front
    fn grow_for(&mut self, extra: usize) {
        let active = self.len();
        let needed = active + extra;
        let mut new_capacity = (self.capacity() * 2).max(needed + needed / 10);
        if let Some(cap) = self.grow_cap {
            // Respect the configured ceiling, but never allocate less than
            // the pending write needs.
            new_capacity = new_capacity.min(cap).max(needed);
        }

        debug!(
            old_capacity = self.capacity(),
            new_capacity, active, "growing history buffer"
        );

        let mut slots = vec![None; new_capacity];
        let mut sizes = vec![0u64; new_capacity];
        for i in 0..active {
            slots[i] = self.slots[self.head + i].take();
            sizes[i] = self.sizes[self.head + i];
        }

        self.slots = slots;
        self.sizes = sizes;
        self.head = 0;
        self.tail = active;
        self.rebuild_indices();
    }

    /// Rebuild both derived indices from the live range
    fn rebuild_indices(&mut self) {
        self.id_index.clear();
        self.time_index.clear();
        for slot in self.head..self.tail {
            if let Some(msg) = &self.slots[slot] {
                self.id_index.insert(msg.id(), slot);
                if let Some(meta) = msg.metadata() {
                    self.time_index.insert(meta.timestamp, slot);
                }
            }
        }
    }

    /// Reset to empty: cursors, indices, and the memory counter
    pub(super) fn clear(&mut self) {
        for slot in self.head..self.tail {
            self.slots[slot] = None;
            self.sizes[slot] = 0;
        }
        self.head = 0;
        self.tail = 0;
        self.id_index.clear();
        self.time_index.clear();
        self.memory_bytes = 0;
    }
}
