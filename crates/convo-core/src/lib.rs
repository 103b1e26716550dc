//! # convo-core
//!
//! Bounded, thread-safe conversation history for chat applications.
//!
//! The crate stores an ordered transcript of messages under configurable
//! count, age, and memory limits. Limits are enforced lazily: cheap
//! heuristics on the write path decide when batched eviction pays for
//! itself, so steady-state writes stay O(1).
//!
//! ## Features
//!
//! - **Bounded storage**: count, age, and memory limits, each optional
//! - **Lazy compaction**: eviction runs in batches, not per write
//! - **Fast lookups**: O(1) by-id retrieval and minute-bucketed time index
//! - **Atomic batches**: multi-message insertion is all-or-nothing
//! - **Thread registry**: independent histories per conversation thread
//!
//! ## Quick Start
//!
//! ```rust
//! use convo_core::{ChatMessage, History, HistoryConfig};
//!
//! let history = History::new(HistoryConfig::memory_constrained());
//! history.add(ChatMessage::user("Hello!").into_ref()).unwrap();
//! history.add(ChatMessage::assistant("Hi there.").into_ref()).unwrap();
//!
//! assert_eq!(history.len(), 2);
//! assert_eq!(history.get_last(1)[0].content(), Some("Hi there."));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]
#![warn(clippy::all)]

pub mod error;
pub mod history;
pub mod message;

pub use error::{HistoryError, Result};
pub use history::{
    estimate_size, History, HistoryConfig, HistorySnapshot, SearchOptions, ThreadRegistry,
    ENTRY_OVERHEAD_BYTES, INDEX_ENTRY_OVERHEAD_BYTES,
};
pub use message::{ChatMessage, Message, MessageError, MessageMetadata, MessageRef, Role};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "convo-core");
    }

    #[test]
    fn test_end_to_end_conversation() {
        let registry = ThreadRegistry::new(HistoryConfig::default());
        let thread = registry.get_thread("support-42");

        thread
            .add_batch(vec![
                ChatMessage::system("You are a helpful support agent.").into_ref(),
                ChatMessage::user("My invoice total looks wrong.").into_ref(),
                ChatMessage::assistant("Let me pull up that invoice.").into_ref(),
                ChatMessage::tool("{\"invoice\":\"INV-993\",\"total\":41.2}").into_ref(),
                ChatMessage::assistant("The total is $41.20 after the credit.").into_ref(),
            ])
            .unwrap();

        let invoice_hits = thread.search(&SearchOptions {
            query: Some("invoice".to_string()),
            ..Default::default()
        });
        assert_eq!(invoice_hits.len(), 3);

        let snapshot = thread.snapshot();
        assert_eq!(snapshot.messages.len(), 5);
        assert_eq!(snapshot.total_messages, 5);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("INV-993"));

        assert!(registry.delete_thread("support-42"));
        assert_eq!(registry.get_thread("support-42").len(), 0);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let history = History::new(HistoryConfig::default());

        std::thread::scope(|scope| {
            for i in 0..10 {
                let history = &history;
                scope.spawn(move || {
                    history
                        .add(ChatMessage::user(format!("writer {i}")).into_ref())
                        .unwrap();
                });
            }
            for _ in 0..4 {
                let history = &history;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let seen = history.get_all();
                        assert!(seen.len() <= 10);
                        let _ = history.current_memory_bytes();
                    }
                });
            }
        });

        assert_eq!(history.len(), 10);
        assert_eq!(history.total_messages(), 10);
    }
}
