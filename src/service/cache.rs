//! Bounded LRU cache for analysis results.
//!
//! When full, the oldest-accessed 20% of entries (at least one) are evicted
//! before the next insert.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::models::{ConnectionOpportunity, ConnectionWindows, Schedule};

/// Default number of cached analyses.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Cache key of an opportunity analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    /// Schedule id.
    pub schedule_id: String,
    /// Hash of the schedule, opportunities, and windows.
    pub fingerprint: u64,
}

impl AnalysisKey {
    /// Key of an analysis input.
    ///
    /// Fails only if the input cannot be serialized.
    pub fn new(
        schedule: &Schedule,
        opportunities: &[ConnectionOpportunity],
        windows: &ConnectionWindows,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(&(schedule, opportunities, windows))?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(Self {
            schedule_id: schedule.id.clone(),
            fingerprint: hasher.finish(),
        })
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_access: u64,
}

/// LRU map with hit and miss counters.
#[derive(Debug)]
pub struct ResultCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> ResultCache<K, V> {
    /// Empty cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached value, counting a hit or a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.clock += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.clock;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores a value, evicting first when full.
    pub fn insert(&mut self, key: K, value: V) {
        self.clock += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                last_access: self.clock,
            },
        );
    }

    fn evict(&mut self) {
        let count = (self.capacity / 5).max(1);
        let mut by_age: Vec<(u64, K)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.last_access, k.clone()))
            .collect();
        by_age.sort_by_key(|(access, _)| *access);
        for (_, key) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        tracing::trace!(evicted = count, remaining = self.entries.len(), "cache eviction");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lookups that found an entry.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drops every entry; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, Trip};

    #[test]
    fn test_hits_and_misses() {
        let mut cache: ResultCache<u32, &str> = ResultCache::new(4);
        assert_eq!(cache.get(&1), None);
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_evicts_oldest_fifth() {
        let mut cache: ResultCache<u32, u32> = ResultCache::new(10);
        for k in 0..10 {
            cache.insert(k, k);
        }
        // touch 0 and 1 so 2 and 3 become the oldest
        cache.get(&0);
        cache.get(&1);
        cache.insert(10, 10);
        assert_eq!(cache.len(), 9);
        assert!(cache.get(&0).is_some());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&2).is_none());
        assert!(cache.get(&3).is_none());
        assert!(cache.get(&10).is_some());
    }

    #[test]
    fn test_small_cache_evicts_one() {
        let mut cache: ResultCache<u32, u32> = ResultCache::new(2);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let s = Schedule::new("S", "R").with_trip(Trip::new(1, 1).with_stop("A", 600, 600));
        let opps = vec![ConnectionOpportunity::new("C", ConnectionType::GoTrain, "A", 590)];
        let windows = ConnectionWindows::new();
        let a = AnalysisKey::new(&s, &opps, &windows).unwrap();
        let b = AnalysisKey::new(&s, &opps, &windows).unwrap();
        assert_eq!(a, b);

        let moved = vec![ConnectionOpportunity::new("C", ConnectionType::GoTrain, "A", 591)];
        let c = AnalysisKey::new(&s, &moved, &windows).unwrap();
        assert_eq!(a.schedule_id, c.schedule_id);
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}
