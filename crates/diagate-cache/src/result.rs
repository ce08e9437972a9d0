//! Bounded, time-expiring result cache.
//!
//! Entries expire a fixed TTL after insertion. Expiry is lazy: [`ResultCache::get`]
//! treats an expired entry as a miss but leaves it in place until the next
//! [`ResultCache::prune`].
//!
//! # Eviction
//!
//! When the entry count exceeds `max_entries` after expired entries are gone,
//! the oldest *inserted* entries are evicted first. Reads never refresh an
//! entry's position, so this is insertion-order eviction and not LRU: an old,
//! frequently read entry is evicted before a new, never read one.
//!
//! # Pruning
//!
//! There is no background timer. [`ResultCache::lookup`] prunes before reading
//! when the cache is over capacity or `prune_interval` has passed since the
//! last prune, so pruning piggybacks on request traffic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::lock::lock;

/// Default time-to-live for cached results (120 seconds).
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// Default maximum number of cached results.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Default minimum interval between opportunistic prunes (30 seconds).
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning knobs for [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lifetime of an entry from insertion.
    pub ttl: Duration,
    /// Entry count above which a prune is forced and oldest entries evicted.
    pub max_entries: usize,
    /// Minimum time between opportunistic prunes.
    pub prune_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        }
    }
}

/// A stored value with its expiry and insertion sequence number.
struct Slot<V> {
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    seq: u64,
    value: V,
}

impl<V> Slot<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

struct Inner<V> {
    entries: HashMap<String, Slot<V>>,
    /// Insertion order: sequence number -> key. The first entry is the oldest.
    order: BTreeMap<u64, String>,
    next_seq: u64,
    last_prune: Option<Instant>,
}

/// Counts of entries removed by a single prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub expired: usize,
    pub evicted: usize,
}

/// Thread-safe result cache with TTL expiry and insertion-order eviction.
///
/// All operations take the current time explicitly so that expiry is
/// deterministic under test.
pub struct ResultCache<V> {
    settings: CacheSettings,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                last_prune: None,
            }),
        }
    }

    /// Cache settings.
    #[must_use]
    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Return the value for `key` if present and not yet expired at `now`.
    pub fn get(&self, key: &str, now: Instant) -> Option<V> {
        let inner = lock(&self.inner, "result_cache.get");
        inner
            .entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    /// Prune if due, then [`get`](Self::get).
    ///
    /// A prune is due when the entry count exceeds `max_entries` or at least
    /// `prune_interval` has elapsed since the previous prune.
    pub fn lookup(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = lock(&self.inner, "result_cache.lookup");

        let over_capacity = inner.entries.len() > self.settings.max_entries;
        let interval_elapsed = inner.last_prune.is_none_or(|last| {
            now.saturating_duration_since(last) >= self.settings.prune_interval
        });
        if over_capacity || interval_elapsed {
            let stats = Self::prune_locked(&mut inner, self.settings.max_entries, now);
            if stats.expired > 0 || stats.evicted > 0 {
                tracing::debug!(
                    expired = stats.expired,
                    evicted = stats.evicted,
                    remaining = inner.entries.len(),
                    "Pruned result cache"
                );
            }
        }

        inner
            .entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    /// Store `value` under `key`, expiring `ttl` after `now`.
    ///
    /// A TTL too large to add to `now` keeps the entry until it is evicted.
    ///
    /// Replacing an existing key counts as a fresh insertion: the entry moves
    /// to the newest end of the eviction order.
    pub fn put(&self, key: &str, value: V, now: Instant) {
        let mut inner = lock(&self.inner, "result_cache.put");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let slot = Slot {
            expires_at: now.checked_add(self.settings.ttl),
            seq,
            value,
        };
        if let Some(previous) = inner.entries.insert(key.to_owned(), slot) {
            inner.order.remove(&previous.seq);
        }
        inner.order.insert(seq, key.to_owned());
    }

    /// Remove expired entries, then evict oldest-inserted entries until the
    /// count is within `max_entries`.
    pub fn prune(&self, now: Instant) -> PruneStats {
        let mut inner = lock(&self.inner, "result_cache.prune");
        Self::prune_locked(&mut inner, self.settings.max_entries, now)
    }

    /// Number of stored entries, including expired ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner, "result_cache.len").entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_locked(inner: &mut Inner<V>, max_entries: usize, now: Instant) -> PruneStats {
        let mut stats = PruneStats::default();

        let expired: Vec<(String, u64)> = inner
            .entries
            .iter()
            .filter(|(_, slot)| !slot.is_live(now))
            .map(|(key, slot)| (key.clone(), slot.seq))
            .collect();
        for (key, seq) in expired {
            inner.entries.remove(&key);
            inner.order.remove(&seq);
            stats.expired += 1;
        }

        while inner.entries.len() > max_entries {
            let Some((_, key)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&key);
            stats.evicted += 1;
        }

        inner.last_prune = Some(now);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(max_entries: usize) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(120),
            max_entries,
            prune_interval: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_get_returns_value_within_ttl() {
        let cache = ResultCache::new(settings(10));
        let t0 = Instant::now();

        cache.put("a", 1, t0);

        assert_eq!(cache.get("a", t0), Some(1));
        assert_eq!(cache.get("a", t0 + Duration::from_secs(119)), Some(1));
    }

    #[test]
    fn test_get_treats_expired_as_miss_without_removing() {
        let cache = ResultCache::new(settings(10));
        let t0 = Instant::now();

        cache.put("a", 1, t0);

        // Expiry is exclusive: an entry is dead exactly at its expiry instant
        assert_eq!(cache.get("a", t0 + Duration::from_secs(120)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing_key() {
        let cache: ResultCache<u32> = ResultCache::new(settings(10));
        assert_eq!(cache.get("missing", Instant::now()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prune_removes_expired_first() {
        let cache = ResultCache::new(settings(2));
        let t0 = Instant::now();

        cache.put("old", 1, t0);
        cache.put("mid", 2, t0 + Duration::from_secs(60));
        cache.put("new", 3, t0 + Duration::from_secs(90));

        // At t0+120 "old" has expired; the two survivors fit in the budget
        let stats = cache.prune(t0 + Duration::from_secs(120));

        assert_eq!(stats, PruneStats { expired: 1, evicted: 0 });
        assert_eq!(cache.len(), 2);
        let now = t0 + Duration::from_secs(121);
        assert_eq!(cache.get("mid", now), Some(2));
        assert_eq!(cache.get("new", now), Some(3));
    }

    #[test]
    fn test_prune_evicts_in_insertion_order() {
        let cache = ResultCache::new(settings(2));
        let t0 = Instant::now();

        cache.put("first", 1, t0);
        cache.put("second", 2, t0);
        cache.put("third", 3, t0);
        cache.put("fourth", 4, t0);

        let stats = cache.prune(t0);

        assert_eq!(stats, PruneStats { expired: 0, evicted: 2 });
        assert_eq!(cache.get("first", t0), None);
        assert_eq!(cache.get("second", t0), None);
        assert_eq!(cache.get("third", t0), Some(3));
        assert_eq!(cache.get("fourth", t0), Some(4));
    }

    #[test]
    fn test_reads_do_not_refresh_eviction_order() {
        let cache = ResultCache::new(settings(2));
        let t0 = Instant::now();

        cache.put("hot", 1, t0);
        cache.put("cold", 2, t0);
        for _ in 0..10 {
            assert_eq!(cache.get("hot", t0), Some(1));
        }
        cache.put("newest", 3, t0);

        cache.prune(t0);

        assert_eq!(cache.get("hot", t0), None);
        assert_eq!(cache.get("cold", t0), Some(2));
        assert_eq!(cache.get("newest", t0), Some(3));
    }

    #[test]
    fn test_overwrite_moves_entry_to_newest() {
        let cache = ResultCache::new(settings(2));
        let t0 = Instant::now();

        cache.put("a", 1, t0);
        cache.put("b", 2, t0);
        cache.put("a", 10, t0);
        cache.put("c", 3, t0);

        cache.prune(t0);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b", t0), None);
        assert_eq!(cache.get("a", t0), Some(10));
        assert_eq!(cache.get("c", t0), Some(3));
    }

    #[test]
    fn test_overwrite_resets_expiry() {
        let cache = ResultCache::new(settings(10));
        let t0 = Instant::now();

        cache.put("a", 1, t0);
        cache.put("a", 2, t0 + Duration::from_secs(100));

        assert_eq!(cache.get("a", t0 + Duration::from_secs(150)), Some(2));
    }

    #[test]
    fn test_lookup_prunes_on_first_use() {
        let cache = ResultCache::new(settings(10));
        let t0 = Instant::now();

        cache.put("a", 1, t0);
        assert_eq!(cache.lookup("a", t0 + Duration::from_secs(200)), None);

        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_skips_prune_within_interval() {
        let cache = ResultCache::new(CacheSettings {
            prune_interval: Duration::from_secs(300),
            ..settings(10)
        });
        let t0 = Instant::now();

        // First lookup records the prune time
        assert_eq!(cache.lookup("x", t0), None);

        cache.put("a", 1, t0);
        // Expired, but the prune interval has not elapsed: lazy miss, no removal
        assert_eq!(cache.lookup("a", t0 + Duration::from_secs(121)), None);
        assert_eq!(cache.len(), 1);

        // Interval elapsed: prune runs
        assert_eq!(cache.lookup("a", t0 + Duration::from_secs(300)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_prunes_when_over_capacity() {
        let cache = ResultCache::new(settings(2));
        let t0 = Instant::now();

        assert_eq!(cache.lookup("x", t0), None);
        cache.put("a", 1, t0);
        cache.put("b", 2, t0);
        cache.put("c", 3, t0);

        // Within the prune interval, but over capacity forces a prune
        assert_eq!(cache.lookup("a", t0 + Duration::from_secs(1)), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("c", t0 + Duration::from_secs(1)), Some(3));
    }

    #[test]
    fn test_unrepresentable_ttl_keeps_entry_until_evicted() {
        let cache = ResultCache::new(CacheSettings {
            ttl: Duration::from_secs(u64::MAX),
            ..settings(1)
        });
        let t0 = Instant::now();

        cache.put("a", 1, t0);
        let later = t0 + Duration::from_secs(365 * 24 * 60 * 60);
        assert_eq!(cache.lookup("a", later), Some(1));

        cache.put("b", 2, t0);
        assert_eq!(cache.prune(later), PruneStats { expired: 0, evicted: 1 });
        assert_eq!(cache.get("b", later), Some(2));
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = ResultCache::new(CacheSettings {
            ttl: Duration::ZERO,
            ..settings(10)
        });
        let t0 = Instant::now();

        cache.put("a", 1, t0);

        assert_eq!(cache.get("a", t0), None);
    }
}
