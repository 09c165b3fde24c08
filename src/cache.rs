//! In-memory TTL cache shared by the orchestrator and its collaborators.
//!
//! Entries carry their insertion time; the caller chooses the TTL on read so
//! one cache can serve values with different freshness requirements.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Thread-safe key/value cache with read-time expiry.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get a value if it was stored less than `ttl` ago.
    ///
    /// Expired entries are evicted on access.
    pub async fn get(&self, key: &K, ttl: Duration) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, stored_at)) if stored_at.elapsed() < ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value stamped with the current time.
    pub async fn set(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, (value, Instant::now()));
    }

    /// Drop a single entry.
    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
