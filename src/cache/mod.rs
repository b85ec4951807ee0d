//! Process-local capability cache
//!
//! A read-through accelerator in front of the capabilities table: entries
//! expire purely by time, eviction is local to this process, and concurrent
//! misses on the same key may repopulate twice. Both are acceptable because
//! the underlying lookup is a cheap, idempotent point query; the staleness
//! window is bounded by the TTL.

use crate::domain::Capability;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default TTLs
mod ttl {
    pub const CAPABILITY_SECS: u64 = 300; // 5 minutes
}

struct CacheEntry {
    capability: Capability,
    inserted_at: Instant,
}

/// TTL cache keyed by capability identifier.
///
/// Lifecycle is explicit: populated lazily by the registry's read-through
/// lookup, clearable per key or wholesale. Absence is never cached, so a
/// freshly synced capability becomes visible on the next miss.
pub struct CapabilityCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(ttl::CAPABILITY_SECS))
    }
}

impl CapabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached capability unless the entry has expired.
    pub fn get(&self, cap_key: &str) -> Option<Capability> {
        let entries = self.entries.read().expect("capability cache poisoned");
        let entry = entries.get(cap_key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.capability.clone())
    }

    pub fn insert(&self, capability: Capability) {
        let mut entries = self.entries.write().expect("capability cache poisoned");
        entries.insert(
            capability.cap_key.clone(),
            CacheEntry {
                capability,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Evict a single entry, e.g. after an administrative change.
    pub fn invalidate(&self, cap_key: &str) {
        let mut entries = self.entries.write().expect("capability cache poisoned");
        entries.remove(cap_key);
    }

    /// Evict everything, e.g. after a forced re-discovery.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().expect("capability cache poisoned");
        entries.clear();
    }

    /// Number of live (possibly expired) entries; expired entries are only
    /// reaped on overwrite or invalidation.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("capability cache poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
