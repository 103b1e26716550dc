//! Compaction: when to evict, and how
//!
//! The policy decides whether an incoming write must pay for eviction
//! first; the engine executes the eviction in fixed phases under the
//! exclusive lock. Compaction never fails: it is best-effort reclamation,
//! and the insert path re-checks the memory budget itself afterwards.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{debug, trace};

use super::store::MessageStore;
use super::HistoryConfig;

/// Occupancy fraction above which a pending compaction is promoted
const FRAGMENTATION_NUM: usize = 4;
const FRAGMENTATION_DEN: usize = 5;

/// State of the lazy compaction machine
///
/// `Clean → Pending` when the elapsed-time hint fires; either state moves
/// to `Compacting` for the duration of an engine run, then back to
/// `Clean`. Keeping this explicit (rather than a scattered boolean) makes
/// the trigger policy testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    /// No compaction owed
    Clean,

    /// The elapsed-time hint fired; compact once the buffer fills up
    Pending,

    /// An engine run is in progress
    Compacting,
}

/// Decides whether an incoming write must trigger eviction first
///
/// Evaluated once per insert before any mutation; its only side effect is
/// advancing the pending flag.
#[derive(Debug)]
pub(super) struct CompactionPolicy {
    state: CompactionState,
    last_compaction: DateTime<Utc>,
}

impl CompactionPolicy {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CompactionState::Clean,
            last_compaction: now,
        }
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> CompactionState {
        self.state
    }

    /// Should eviction run before a write of `incoming` bytes proceeds?
    ///
    /// Triggers, most urgent first:
    /// 1. the write would exceed the memory budget;
    /// 2. the live count reached the compaction threshold;
    /// 3. more than `max_age / 10` elapsed since the last run — this only
    ///    arms the pending flag;
    /// 4. the pending flag is armed and the buffer is over 80% occupied.
    pub(super) fn should_compact(
        &mut self,
        config: &HistoryConfig,
        store: &MessageStore,
        incoming: u64,
        now: DateTime<Utc>,
    ) -> bool {
        if config.max_memory_bytes > 0
            && store.memory_bytes() + incoming > config.max_memory_bytes
        {
            return true;
        }

        if store.len() >= config.compact_threshold {
            return true;
        }

        if !config.max_age.is_zero() && self.elapsed_since(now) > config.max_age / 10 {
            self.state = CompactionState::Pending;
        }

        self.state == CompactionState::Pending
            && store.len() * FRAGMENTATION_DEN > store.capacity() * FRAGMENTATION_NUM
    }

    /// Mark an engine run as started
    pub(super) fn begin(&mut self) {
        self.state = CompactionState::Compacting;
    }

    /// Mark an engine run as finished at `now`
    pub(super) fn finish(&mut self, now: DateTime<Utc>) {
        self.state = CompactionState::Clean;
        self.last_compaction = now;
    }

    /// Disarm the pending flag without recording a run
    pub(super) fn disarm(&mut self) {
        self.state = CompactionState::Clean;
    }

    fn elapsed_since(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_compaction).to_std().unwrap_or_default()
    }
}

/// Execute eviction in fixed phases; infallible
///
/// 1. Age cutoff via the time index (stale buckets pruned on the way).
/// 2. Count cutoff, reserving one slot for the write about to land.
/// 3. Memory cutoff, advancing slot-by-slot against a running projection.
/// 4. Defragmentation decision against the post-removal state.
/// 5. Removal of `[head, new_head)` through the single eviction routine.
/// 6. Defragmentation, if phase 4 called for it.
pub(super) fn run_compaction(store: &mut MessageStore, config: &HistoryConfig, now: DateTime<Utc>) {
    let old_head = store.head;
    let mut new_head = store.head;

    // Phase 1: age cutoff.
    if !config.max_age.is_zero() {
        let cutoff = now - chrono_duration(config.max_age);
        let cutoff_bucket = super::index::TimeIndex::bucket_of(cutoff);
        store.time_index.prune_before(cutoff_bucket - 1);
        new_head = store.first_at_or_after(cutoff);
    }

    // Phase 2: count cutoff. Keep at most max_messages - 1 so the
    // incoming record fits without immediately re-triggering.
    if config.max_messages > 0 && store.len() >= config.max_messages {
        let max_start = store.tail - (config.max_messages - 1);
        new_head = new_head.max(max_start);
    }

    // Phase 3: memory cutoff against a projection of the planned removal.
    if config.max_memory_bytes > 0 {
        let mut projected = store.memory_bytes();
        for slot in store.head..new_head {
            projected = projected.saturating_sub(store.sizes[slot]);
        }
        while new_head < store.tail && projected > config.max_memory_bytes {
            projected = projected.saturating_sub(store.sizes[new_head]);
            new_head += 1;
        }
    }

    // Phase 4: decide on defragmentation before removal, using the state
    // the buffer will be in afterwards.
    let active_after = store.tail - new_head;
    let should_defragment = (active_after < store.capacity() / 2 && new_head > 0)
        || store.tail == store.capacity();

    // Phase 5: removal.
    if new_head > store.head {
        store.evict_through(new_head);
    }

    // Phase 6: defragmentation.
    if should_defragment {
        store.defragment();
    }

    if new_head > old_head {
        debug!(
            evicted = new_head - old_head,
            remaining = store.len(),
            defragmented = should_defragment,
            "compacted history"
        );
    } else {
        trace!(remaining = store.len(), "compaction found nothing to evict");
    }
}

fn chrono_duration(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}
