//! Registry of independent conversation threads
//!
//! Each thread owns its own [`History`] instance constructed from the
//! registry's configuration. Instances are handed out as shared handles,
//! so a caller may keep using a thread's history after it has been
//! deleted from the registry; the registry simply stops vending it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{History, HistoryConfig};

/// Maps thread identifiers to their conversation histories
///
/// Lookup-or-create is atomic: concurrent callers asking for the same
/// identifier always receive the same instance.
#[derive(Debug)]
pub struct ThreadRegistry {
    config: HistoryConfig,
    threads: RwLock<HashMap<String, Arc<History>>>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl ThreadRegistry {
    /// Create a registry whose threads inherit `config`
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the history for `thread_id`, creating it on first use
    pub fn get_thread(&self, thread_id: &str) -> Arc<History> {
        let mut threads = self
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread_id, "creating conversation thread");
                Arc::new(History::new(self.config.clone()))
            })
            .clone()
    }

    /// Remove a thread's history; returns whether it existed
    ///
    /// Outstanding handles to the removed history remain valid.
    pub fn delete_thread(&self, thread_id: &str) -> bool {
        let mut threads = self
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        threads.remove(thread_id).is_some()
    }

    /// Identifiers of all registered threads, in no particular order
    pub fn list_threads(&self) -> Vec<String> {
        let threads = self.threads.read().unwrap_or_else(PoisonError::into_inner);
        threads.keys().cloned().collect()
    }

    /// Number of registered threads
    pub fn len(&self) -> usize {
        let threads = self.threads.read().unwrap_or_else(PoisonError::into_inner);
        threads.len()
    }

    /// Whether no threads are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
