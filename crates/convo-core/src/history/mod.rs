//! # Conversation History Engine
//!
//! Bounded, thread-safe storage for an ordered conversation transcript.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              History (façade)                   │
//! │  - insertion, reads, search, snapshots          │
//! │  - one RwLock: writers exclusive, readers shared│
//! └─────────────────────────────────────────────────┘
//!          │               │               │
//!    ┌─────┴─────┐   ┌─────┴──────┐  ┌─────┴─────┐
//!    │  Message  │   │ Compaction │  │  Id/Time  │
//!    │   Store   │   │ Policy +   │  │  Indices  │
//!    │ (ring buf)│   │  Engine    │  │ (derived) │
//!    └───────────┘   └────────────┘  └───────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **O(1) front eviction**: head/tail cursors over a slot array, no shifting
//! 2. **Lazy compaction**: heuristics decide when eviction pays for itself
//! 3. **Cached sizes**: each record is serialized once, at insertion
//! 4. **Derived indices**: id and minute-bucket maps, rebuilt on relocation
//!
//! ## Example
//!
//! ```rust
//! use convo_core::{ChatMessage, History, HistoryConfig, SearchOptions};
//!
//! let history = History::new(HistoryConfig::default());
//! history.add(ChatMessage::user("What's the weather?").into_ref()).unwrap();
//! history.add(ChatMessage::assistant("Sunny, 22C.").into_ref()).unwrap();
//!
//! let hits = history.search(&SearchOptions {
//!     query: Some("weather".to_string()),
//!     ..Default::default()
//! });
//! assert_eq!(hits.len(), 1);
//! ```

mod compaction;
mod index;
mod sizing;
mod store;
mod threads;

pub use sizing::{estimate_size, ENTRY_OVERHEAD_BYTES, INDEX_ENTRY_OVERHEAD_BYTES};
pub use threads::ThreadRegistry;

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::message::{MessageRef, Role};

use compaction::{run_compaction, CompactionPolicy};
use store::MessageStore;

/// Default capacity when no count limit is configured
const DEFAULT_INITIAL_CAPACITY: usize = 1000;

/// Configuration for a history instance, immutable after construction
///
/// Zero values mean "unlimited" for every field except
/// `compact_threshold`, where zero compacts on every single write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of live messages; 0 = unlimited
    pub max_messages: usize,

    /// Maximum message age; zero = unlimited
    pub max_age: Duration,

    /// Live-message count at which compaction triggers
    pub compact_threshold: usize,

    /// Memory budget in bytes; 0 = unlimited
    pub max_memory_bytes: u64,

    /// Maintain the identifier index; disabling it also disables
    /// duplicate detection and O(1) lookups by id
    pub enable_indexing: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 10_000,
            max_age: Duration::from_secs(24 * 60 * 60),
            compact_threshold: 5_000,
            max_memory_bytes: 100 * 1024 * 1024,
            enable_indexing: true,
        }
    }
}

impl HistoryConfig {
    /// No limits at all; compaction effectively never runs
    pub fn unbounded() -> Self {
        Self {
            max_messages: 0,
            max_age: Duration::ZERO,
            compact_threshold: usize::MAX,
            max_memory_bytes: 0,
            enable_indexing: true,
        }
    }

    /// Tight limits for memory-constrained environments
    pub fn memory_constrained() -> Self {
        Self {
            max_messages: 1_000,
            max_age: Duration::from_secs(60 * 60),
            compact_threshold: 500,
            max_memory_bytes: 5 * 1024 * 1024,
            enable_indexing: true,
        }
    }

    fn initial_capacity(&self) -> usize {
        if self.max_messages > 0 {
            self.max_messages
        } else {
            DEFAULT_INITIAL_CAPACITY
        }
    }
}

/// Search criteria for [`History::search`]
///
/// All filters are optional and conjunctive. Records without metadata are
/// excluded whenever a time bound is present.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Case-insensitive substring to match against content
    pub query: Option<String>,

    /// Only messages authored under this role
    pub role: Option<Role>,

    /// Only messages at or after this time
    pub start_time: Option<DateTime<Utc>>,

    /// Only messages at or before this time
    pub end_time: Option<DateTime<Utc>>,

    /// Stop after this many results
    pub max_results: Option<usize>,
}

/// Point-in-time copy of a history's live messages and running totals
///
/// Safe to hold and serialize after the lock is released; the records
/// themselves are immutable.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    /// Live messages in insertion order
    pub messages: Vec<MessageRef>,

    /// Total messages ever added, including evicted ones
    pub total_messages: u64,

    /// Number of compaction runs so far
    pub compaction_count: u64,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl HistorySnapshot {
    /// Serialize the snapshot to JSON
    ///
    /// Records are rendered through their own canonical encoding, so the
    /// output matches what the size estimator accounted for.
    pub fn to_json(&self) -> Result<String> {
        let mut rendered = Vec::with_capacity(self.messages.len());
        for msg in &self.messages {
            let raw = msg.to_json()?;
            rendered.push(serde_json::from_str::<serde_json::Value>(&raw)?);
        }

        let value = serde_json::json!({
            "messages": rendered,
            "totalMessages": self.total_messages,
            "compactionCount": self.compaction_count,
            "timestamp": self.timestamp,
        });
        Ok(serde_json::to_string(&value)?)
    }
}

#[derive(Debug)]
struct HistoryInner {
    store: MessageStore,
    policy: CompactionPolicy,
    total_messages: u64,
    compaction_count: u64,
}

/// Bounded conversation history for a single thread of conversation
///
/// All mutating operations serialize through one writer lock; reads share
/// it. A reader observes some prefix of the write order, never a torn
/// state. Limits are enforced on every write: count and age by eviction,
/// memory by eviction first and rejection as the last resort.
#[derive(Debug)]
pub struct History {
    config: HistoryConfig,
    inner: RwLock<HistoryInner>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl History {
    /// Create a history with the given configuration
    pub fn new(config: HistoryConfig) -> Self {
        let store = MessageStore::new(
            config.initial_capacity(),
            config.enable_indexing,
            config.max_messages,
        );
        Self {
            config,
            inner: RwLock::new(HistoryInner {
                store,
                policy: CompactionPolicy::new(Utc::now()),
                total_messages: 0,
                compaction_count: 0,
            }),
        }
    }

    /// The configuration this history was constructed with
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Add a message to the history
    ///
    /// May evict older messages first (count, age, or memory pressure).
    /// Fails without mutating anything on an empty id, failed record
    /// validation, a duplicate id, an encoding failure, or a write that
    /// exceeds the memory budget even after compaction.
    pub fn add(&self, msg: MessageRef) -> Result<()> {
        if msg.id().is_empty() {
            return Err(HistoryError::InvalidArgument(
                "message ID must not be empty".to_string(),
            ));
        }
        msg.validate()?;
        let size = estimate_size(msg.as_ref(), self.config.enable_indexing)?;

        let mut guard = self.write();
        let inner = &mut *guard;

        if inner.store.contains_id(msg.id()) {
            return Err(HistoryError::Duplicate(msg.id().to_string()));
        }

        let now = Utc::now();
        if inner.policy.should_compact(&self.config, &inner.store, size, now) {
            inner.policy.begin();
            run_compaction(&mut inner.store, &self.config, now);
            inner.compaction_count += 1;
            inner.policy.finish(now);
        }

        self.check_budget(&inner.store, size)?;

        inner.store.ensure_room_for(1);
        inner.store.push(msg, size);
        inner.total_messages += 1;
        Ok(())
    }

    /// Add multiple messages atomically
    ///
    /// Every record is validated and checked for duplicates — against the
    /// store and within the batch — before any mutation. Compaction runs
    /// at most once, for the aggregate size. Any failure leaves the
    /// history exactly as it was.
    pub fn add_batch(&self, msgs: Vec<MessageRef>) -> Result<()> {
        if msgs.is_empty() {
            return Ok(());
        }

        let mut sizes = Vec::with_capacity(msgs.len());
        let mut total: u64 = 0;
        let mut batch_ids = HashSet::with_capacity(msgs.len());
        for (i, msg) in msgs.iter().enumerate() {
            if msg.id().is_empty() {
                return Err(HistoryError::InvalidArgument(format!(
                    "message at index {i} has an empty ID"
                )));
            }
            msg.validate()?;
            if !batch_ids.insert(msg.id().to_string()) {
                return Err(HistoryError::Duplicate(msg.id().to_string()));
            }
            let size = estimate_size(msg.as_ref(), self.config.enable_indexing)?;
            sizes.push(size);
            total += size;
        }

        let mut guard = self.write();
        let inner = &mut *guard;

        for msg in &msgs {
            if inner.store.contains_id(msg.id()) {
                return Err(HistoryError::Duplicate(msg.id().to_string()));
            }
        }

        let now = Utc::now();
        if inner.policy.should_compact(&self.config, &inner.store, total, now) {
            inner.policy.begin();
            run_compaction(&mut inner.store, &self.config, now);
            inner.compaction_count += 1;
            inner.policy.finish(now);
        }

        self.check_budget(&inner.store, total)?;

        inner.store.ensure_room_for(msgs.len());
        let count = msgs.len() as u64;
        for (msg, size) in msgs.into_iter().zip(sizes) {
            inner.store.push(msg, size);
        }
        inner.total_messages += count;
        Ok(())
    }

    /// Retrieve a message by id in O(1)
    ///
    /// Requires identifier indexing; with indexing disabled every lookup
    /// misses.
    pub fn get(&self, id: &str) -> Result<MessageRef> {
        let inner = self.read();
        inner
            .store
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    /// All live messages in insertion order
    pub fn get_all(&self) -> Vec<MessageRef> {
        let inner = self.read();
        inner.store.iter_live().cloned().collect()
    }

    /// Messages in the half-open range `[start, end)` of the live order
    pub fn get_range(&self, start: usize, end: usize) -> Result<Vec<MessageRef>> {
        let inner = self.read();
        let size = inner.store.len();
        if start > end || end > size {
            return Err(HistoryError::OutOfRange { start, end, size });
        }

        let from = inner.store.head + start;
        let to = inner.store.head + end;
        Ok(inner.store.slots[from..to]
            .iter()
            .filter_map(|slot| slot.clone())
            .collect())
    }

    /// The last `n` messages in insertion order
    pub fn get_last(&self, n: usize) -> Vec<MessageRef> {
        let inner = self.read();
        let n = n.min(inner.store.len());
        inner.store.slots[inner.store.tail - n..inner.store.tail]
            .iter()
            .filter_map(|slot| slot.clone())
            .collect()
    }

    /// All live messages authored under `role`, in insertion order
    pub fn get_by_role(&self, role: Role) -> Vec<MessageRef> {
        let inner = self.read();
        inner
            .store
            .iter_live()
            .filter(|msg| msg.role() == role)
            .cloned()
            .collect()
    }

    /// All live messages created strictly after `timestamp`
    ///
    /// Messages without metadata carry no timestamp and are excluded.
    pub fn get_after(&self, timestamp: DateTime<Utc>) -> Vec<MessageRef> {
        let inner = self.read();
        inner
            .store
            .iter_live()
            .filter(|msg| {
                msg.metadata()
                    .map(|meta| meta.timestamp > timestamp)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Linear scan over the live range applying every filter in `options`
    ///
    /// A start-time bound moves the scan's starting position forward via
    /// the time index instead of walking from `head`.
    pub fn search(&self, options: &SearchOptions) -> Vec<MessageRef> {
        let inner = self.read();
        let store = &inner.store;

        let start = match options.start_time {
            Some(cutoff) => store.first_at_or_after(cutoff),
            None => store.head,
        };

        let query = options.query.as_ref().map(|q| q.to_lowercase());
        let time_bounded = options.start_time.is_some() || options.end_time.is_some();

        let mut results = Vec::new();
        for slot in start..store.tail {
            let Some(msg) = &store.slots[slot] else {
                continue;
            };

            if let Some(role) = options.role {
                if msg.role() != role {
                    continue;
                }
            }

            if time_bounded {
                let Some(meta) = msg.metadata() else {
                    continue;
                };
                if let Some(start_time) = options.start_time {
                    if meta.timestamp < start_time {
                        continue;
                    }
                }
                if let Some(end_time) = options.end_time {
                    if meta.timestamp > end_time {
                        continue;
                    }
                }
            }

            if let Some(query) = &query {
                match msg.content() {
                    Some(content) if content.to_lowercase().contains(query.as_str()) => {}
                    _ => continue,
                }
            }

            results.push(msg.clone());
            if let Some(max) = options.max_results {
                if results.len() >= max {
                    break;
                }
            }
        }

        results
    }

    /// Take an immutable snapshot of the live messages and totals
    pub fn snapshot(&self) -> HistorySnapshot {
        let inner = self.read();
        HistorySnapshot {
            messages: inner.store.iter_live().cloned().collect(),
            total_messages: inner.total_messages,
            compaction_count: inner.compaction_count,
            timestamp: Utc::now(),
        }
    }

    /// Remove every message and reset the memory counter
    ///
    /// The monotonic total-ever-added counter is deliberately kept.
    pub fn clear(&self) {
        let mut guard = self.write();
        let inner = &mut *guard;
        inner.store.clear();
        inner.policy.disarm();
    }

    /// Number of live messages
    pub fn len(&self) -> usize {
        self.read().store.len()
    }

    /// Whether no live messages are stored
    pub fn is_empty(&self) -> bool {
        self.read().store.is_empty()
    }

    /// Total messages ever added, including evicted and cleared ones
    pub fn total_messages(&self) -> u64 {
        self.read().total_messages
    }

    /// Number of compaction runs so far
    pub fn compaction_count(&self) -> u64 {
        self.read().compaction_count
    }

    /// Bytes currently accounted to live messages
    pub fn current_memory_bytes(&self) -> u64 {
        self.read().store.memory_bytes()
    }

    /// Reject the write if it would exceed the memory budget
    ///
    /// Called after the optional compaction pass: eviction is best-effort,
    /// rejection is the guarantee.
    fn check_budget(&self, store: &MessageStore, incoming: u64) -> Result<()> {
        if self.config.max_memory_bytes > 0
            && store.memory_bytes() + incoming > self.config.max_memory_bytes
        {
            return Err(HistoryError::ResourceExhausted {
                current: store.memory_bytes(),
                incoming,
                limit: self.config.max_memory_bytes,
            });
        }
        Ok(())
    }

    // Writers never unwind between related mutations (failures return
    // before mutation begins), so a guard recovered from poisoning is
    // still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HistoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HistoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, MessageMetadata};
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn counted_config() -> HistoryConfig {
        HistoryConfig {
            max_messages: 5,
            max_age: Duration::ZERO,
            compact_threshold: 5,
            max_memory_bytes: 0,
            enable_indexing: true,
        }
    }

    #[test]
    fn test_add_and_retrieve() {
        let history = History::new(HistoryConfig::default());
        let msg1 = ChatMessage::user("First message").into_ref();
        let msg2 = ChatMessage::assistant("Second message").into_ref();
        let id1 = msg1.id().to_string();

        history.add(msg1).unwrap();
        history.add(msg2).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(&id1).unwrap().id(), id1);
        assert_eq!(history.get_all().len(), 2);
    }

    #[test]
    fn test_duplicate_rejected_without_mutation() {
        let history = History::new(HistoryConfig::default());
        let msg = ChatMessage::user("Test message");
        history.add(msg.clone().into_ref()).unwrap();

        let len_before = history.len();
        let memory_before = history.current_memory_bytes();

        let err = history.add(msg.into_ref()).unwrap_err();
        assert!(matches!(err, HistoryError::Duplicate(_)));
        assert_eq!(history.len(), len_before);
        assert_eq!(history.current_memory_bytes(), memory_before);
    }

    #[test]
    fn test_empty_id_rejected() {
        let history = History::new(HistoryConfig::default());
        let msg = ChatMessage::user("no id").with_id("").into_ref();
        let err = history.add(msg).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        assert_eq!(history.len(), 0);
    }

    #[test]
    fn test_add_batch() {
        let history = History::new(HistoryConfig::default());
        let batch = vec![
            ChatMessage::system("System prompt").into_ref(),
            ChatMessage::user("User message").into_ref(),
            ChatMessage::assistant("Assistant response").into_ref(),
        ];

        history.add_batch(batch).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.total_messages(), 3);
    }

    #[test]
    fn test_add_batch_is_atomic() {
        let history = History::new(HistoryConfig::default());
        let existing = ChatMessage::user("already here");
        history.add(existing.clone().into_ref()).unwrap();

        // The duplicate sits at the end: nothing before it may land either.
        let batch = vec![
            ChatMessage::user("fresh 1").into_ref(),
            ChatMessage::user("fresh 2").into_ref(),
            existing.into_ref(),
        ];
        let err = history.add_batch(batch).unwrap_err();
        assert!(matches!(err, HistoryError::Duplicate(_)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_add_batch_rejects_in_batch_duplicates() {
        let history = History::new(HistoryConfig::default());
        let dup = ChatMessage::user("twice");
        let batch = vec![dup.clone().into_ref(), dup.into_ref()];

        assert!(matches!(
            history.add_batch(batch),
            Err(HistoryError::Duplicate(_))
        ));
        assert_eq!(history.len(), 0);
    }

    #[test]
    fn test_get_range() {
        let history = History::new(HistoryConfig::default());
        for label in ["A", "B", "C", "D", "E"] {
            history
                .add(ChatMessage::user(format!("Message {label}")).into_ref())
                .unwrap();
        }

        let range = history.get_range(1, 4).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].content(), Some("Message B"));

        let err = history.get_range(3, 9).unwrap_err();
        assert!(matches!(err, HistoryError::OutOfRange { .. }));
        assert!(history.get_range(4, 2).is_err());
        assert!(history.get_range(0, 5).is_ok());
    }

    #[test]
    fn test_get_last() {
        let history = History::new(HistoryConfig::default());
        for label in ["A", "B", "C", "D", "E"] {
            history
                .add(ChatMessage::user(format!("Message {label}")).into_ref())
                .unwrap();
        }

        let last2 = history.get_last(2);
        assert_eq!(last2.len(), 2);
        assert_eq!(last2[1].content(), Some("Message E"));

        assert_eq!(history.get_last(10).len(), 5);
        assert!(history.get_last(0).is_empty());
    }

    #[test]
    fn test_get_by_role() {
        let history = History::new(HistoryConfig::default());
        history.add(ChatMessage::system("System").into_ref()).unwrap();
        history.add(ChatMessage::user("User 1").into_ref()).unwrap();
        history
            .add(ChatMessage::assistant("Assistant 1").into_ref())
            .unwrap();
        history.add(ChatMessage::user("User 2").into_ref()).unwrap();

        assert_eq!(history.get_by_role(Role::User).len(), 2);
        assert_eq!(history.get_by_role(Role::Assistant).len(), 1);
        assert_eq!(history.get_by_role(Role::System).len(), 1);
        assert!(history.get_by_role(Role::Tool).is_empty());
    }

    #[test]
    fn test_get_after() {
        let history = History::new(HistoryConfig::default());
        let now = Utc::now();

        let old = ChatMessage::user("Old message")
            .with_metadata(MessageMetadata::at(now - ChronoDuration::minutes(10)));
        let newer = ChatMessage::user("New message")
            .with_metadata(MessageMetadata::at(now + ChronoDuration::seconds(1)));
        let mut no_meta = ChatMessage::user("Timeless");
        no_meta.metadata = None;

        history.add(old.into_ref()).unwrap();
        history.add(newer.into_ref()).unwrap();
        history.add(no_meta.into_ref()).unwrap();

        let recent = history.get_after(now - ChronoDuration::minutes(5));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content(), Some("New message"));
    }

    #[test]
    fn test_count_compaction_scenario() {
        let history = History::new(counted_config());
        for i in 0..8 {
            history
                .add(ChatMessage::user(format!("Message {i}")).into_ref())
                .unwrap();
        }

        assert_eq!(history.len(), 5);
        let all = history.get_all();
        assert_eq!(all[0].content(), Some("Message 3"));
        assert_eq!(all[4].content(), Some("Message 7"));
        assert!(history.compaction_count() >= 1);
        assert_eq!(history.total_messages(), 8);
    }

    #[test]
    fn test_age_compaction_evicts_stale_messages() {
        let history = History::new(HistoryConfig {
            max_messages: 0,
            max_age: Duration::from_secs(3600),
            compact_threshold: 3,
            max_memory_bytes: 0,
            enable_indexing: true,
        });

        let stale = ChatMessage::user("Old message")
            .with_metadata(MessageMetadata::at(Utc::now() - ChronoDuration::hours(2)));
        let stale_id = stale.id.clone();
        history.add(stale.into_ref()).unwrap();

        // The threshold fires on the write that finds 3 live messages.
        for i in 0..3 {
            history
                .add(ChatMessage::user(format!("New message {i}")).into_ref())
                .unwrap();
        }

        assert_eq!(history.len(), 3);
        assert!(matches!(
            history.get(&stale_id),
            Err(HistoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_oversized_message_exhausts_budget() {
        let history = History::new(HistoryConfig {
            max_messages: 0,
            max_age: Duration::ZERO,
            compact_threshold: 5_000,
            max_memory_bytes: 1024,
            enable_indexing: true,
        });

        let msg = ChatMessage::user("x".repeat(2048)).into_ref();
        let err = history.add(msg).unwrap_err();
        assert!(matches!(err, HistoryError::ResourceExhausted { .. }));
        assert_eq!(history.len(), 0);
        assert_eq!(history.current_memory_bytes(), 0);
    }

    #[test]
    fn test_memory_budget_holds_under_sustained_writes() {
        let budget = 8 * 1024;
        let history = History::new(HistoryConfig {
            max_messages: 0,
            max_age: Duration::ZERO,
            compact_threshold: 5_000,
            max_memory_bytes: budget,
            enable_indexing: true,
        });

        // Fill until the budget rejects a write; the counter never crosses
        // the limit and the rejected write leaves nothing behind.
        let mut accepted = 0;
        let mut rejected = false;
        for i in 0..10 {
            let result =
                history.add(ChatMessage::user(format!("{i}: {}", "y".repeat(3000))).into_ref());
            match result {
                Ok(()) => accepted += 1,
                Err(HistoryError::ResourceExhausted { .. }) => {
                    rejected = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
            assert!(history.current_memory_bytes() <= budget);
        }
        assert!(rejected);
        assert_eq!(history.len(), accepted);

        // A write small enough to fit the remaining headroom still lands.
        history.add(ChatMessage::user("tiny").into_ref()).unwrap();
        assert!(history.current_memory_bytes() <= budget);
    }

    #[test]
    fn test_clear_keeps_total_counter() {
        let history = History::new(HistoryConfig::default());
        for i in 0..3 {
            history
                .add(ChatMessage::user(format!("Message {i}")).into_ref())
                .unwrap();
        }

        history.clear();

        assert_eq!(history.len(), 0);
        assert_eq!(history.current_memory_bytes(), 0);
        assert_eq!(history.total_messages(), 3);
        assert!(history.get_all().is_empty());
    }

    #[test]
    fn test_snapshot() {
        let history = History::new(HistoryConfig::default());
        history.add(ChatMessage::user("Message 1").into_ref()).unwrap();
        history
            .add(ChatMessage::assistant("Message 2").into_ref())
            .unwrap();

        let snapshot = history.snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.total_messages, 2);
        assert_eq!(snapshot.compaction_count, 0);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"totalMessages\":2"));
        assert!(json.contains("Message 1"));
    }

    #[test]
    fn test_search_scenarios() {
        let history = History::new(HistoryConfig::default());
        let seeded = [
            ChatMessage::system("You are a weather assistant."),
            ChatMessage::user("What's the Weather in NYC?"),
            ChatMessage::assistant("The weather in NYC is sunny."),
            ChatMessage::user("How about San Francisco?"),
            ChatMessage::assistant("San Francisco has foggy weather."),
        ];
        for msg in seeded {
            history.add(msg.into_ref()).unwrap();
        }

        // Case-insensitive substring, order preserved.
        let hits = history.search(&SearchOptions {
            query: Some("weather".to_string()),
            ..Default::default()
        });
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].role(), Role::System);

        let user_hits = history.search(&SearchOptions {
            role: Some(Role::User),
            ..Default::default()
        });
        assert_eq!(user_hits.len(), 2);

        let combined = history.search(&SearchOptions {
            query: Some("weather".to_string()),
            role: Some(Role::User),
            ..Default::default()
        });
        assert_eq!(combined.len(), 1);

        let limited = history.search(&SearchOptions {
            query: Some("weather".to_string()),
            max_results: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_search_time_bounds_exclude_metadata_less_messages() {
        let history = History::new(HistoryConfig::default());
        let now = Utc::now();

        let old = ChatMessage::user("old note")
            .with_metadata(MessageMetadata::at(now - ChronoDuration::hours(2)));
        let fresh = ChatMessage::user("fresh note")
            .with_metadata(MessageMetadata::at(now - ChronoDuration::minutes(1)));
        let mut timeless = ChatMessage::user("timeless note");
        timeless.metadata = None;

        history.add(old.into_ref()).unwrap();
        history.add(timeless.into_ref()).unwrap();
        history.add(fresh.into_ref()).unwrap();

        let hits = history.search(&SearchOptions {
            start_time: Some(now - ChronoDuration::hours(1)),
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content(), Some("fresh note"));
    }

    #[test]
    fn test_concurrent_adds_and_reads() {
        let history = History::new(HistoryConfig::default());

        std::thread::scope(|scope| {
            for i in 0..10 {
                let history = &history;
                scope.spawn(move || {
                    history
                        .add(ChatMessage::user(format!("Concurrent message {i}")).into_ref())
                        .unwrap();
                });
            }
            for _ in 0..10 {
                let history = &history;
                scope.spawn(move || {
                    let _ = history.get_all();
                    let _ = history.len();
                    let _ = history.get_last(5);
                });
            }
        });

        assert_eq!(history.len(), 10);
        assert_eq!(history.total_messages(), 10);
    }

    proptest! {
        #[test]
        fn prop_count_limit_holds_and_order_is_a_suffix(
            contents in proptest::collection::vec("[a-z]{0,32}", 1..40)
        ) {
            let history = History::new(counted_config());
            let mut inserted = Vec::new();

            for content in &contents {
                let msg = ChatMessage::user(content.clone());
                inserted.push(msg.id.clone());
                history.add(msg.into_ref()).unwrap();
                prop_assert!(history.len() <= 5);
            }

            let live: Vec<String> =
                history.get_all().iter().map(|m| m.id().to_string()).collect();
            prop_assert_eq!(&inserted[inserted.len() - live.len()..], live.as_slice());
        }

        #[test]
        fn prop_memory_counter_matches_recomputed_sizes(
            contents in proptest::collection::vec("[a-z]{0,64}", 1..30)
        ) {
            let history = History::new(counted_config());
            for content in &contents {
                history.add(ChatMessage::user(content.clone()).into_ref()).unwrap();

                let recomputed: u64 = history
                    .get_all()
                    .iter()
                    .map(|m| estimate_size(m.as_ref(), true).unwrap())
                    .sum();
                prop_assert_eq!(history.current_memory_bytes(), recomputed);
            }
        }
    }
}
