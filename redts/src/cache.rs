//! Series reference cache.
//!
//! Maps a series reference (label set hash) to the store key it was built
//! from, so fast-path appends can skip key encoding. A [`Storage`] owns one
//! cache for its whole lifetime and shares it with every appender it hands
//! out, which is why the map is concurrent. Entries are never evicted.
//!
//! [`Storage`]: crate::storage::Storage

use std::sync::Arc;

use dashmap::DashMap;

/// Concurrent `reference -> key` map.
#[derive(Debug, Default)]
pub struct RefCache {
    keys: DashMap<u64, Arc<str>>,
}

impl RefCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` for `reference`, replacing any previous key.
    pub fn insert(&self, reference: u64, key: &str) {
        // Re-adding a known series is the common case; skip the allocation.
        if let Some(existing) = self.keys.get(&reference)
            && existing.as_ref() == key
        {
            return;
        }
        self.keys.insert(reference, Arc::from(key));
    }

    /// Returns the key recorded for `reference`.
    pub fn get(&self, reference: u64) -> Option<Arc<str>> {
        self.keys.get(&reference).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of cached references.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
