//! A concurrent, weight-bounded LRU cache (§4.1). Finders proceed wait-free
//! against each other and against writers, modulo a single atomic
//! compare-and-swap per (entry, `update_period`) for the amortized recency
//! bump; inserts serialize against each other behind one lock but never
//! block a concurrent `find`.

mod accessor;
mod entry;

pub use accessor::ConstAccessor;
pub use entry::CacheWeight;
use entry::CacheEntry;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Concurrent associative store of `key -> value`, bounded by a total
/// weight budget and evicting least-recently-used entries on overflow.
/// Generic over the `BuildHasher` so callers whose key already carries a
/// fast, uniform digest (e.g. [`crate::hash::ContractHash`]) can skip
/// re-hashing it through the default `RandomState`/SipHash, the same way
/// [`crate::compiler::CompilerService`]'s in-flight `DashSet` does.
pub struct LruWeightCache<K, V, S = RandomState> {
    map: DashMap<K, Arc<CacheEntry<V>>, S>,
    total_weight: AtomicU64,
    max_weight: u32,
    update_period: Duration,
    epoch: Instant,
    /// Serializes `insert` against other `insert`s; never held during
    /// `find`, so readers never block behind a writer.
    insert_lock: Mutex<()>,
}

impl<K, V> LruWeightCache<K, V, RandomState>
where
    K: Eq + Hash + Clone,
    V: CacheWeight,
{
    pub fn new(max_weight: u32, update_period: Duration) -> Self {
        Self::with_hasher(max_weight, update_period, RandomState::default())
    }
}

impl<K, V, S> LruWeightCache<K, V, S>
where
    K: Eq + Hash + Clone,
    V: CacheWeight,
    S: BuildHasher + Clone,
{
    pub fn with_hasher(max_weight: u32, update_period: Duration, hasher: S) -> Self {
        Self {
            map: DashMap::with_hasher(hasher),
            total_weight: AtomicU64::new(0),
            max_weight,
            update_period,
            epoch: Instant::now(),
            insert_lock: Mutex::new(()),
        }
    }

    fn now_tick(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Returns a pinning accessor to the value under `key`, if present.
    /// Bumps the entry's recency tick if at least `update_period` has
    /// elapsed since the last bump; this is the *only* mutation a `find`
    /// performs, and it's a single CAS (best-effort: a losing CAS under
    /// contention is simply skipped, matching the "amortized" contract —
    /// exactness of the tick is not required, only that it roughly tracks
    /// recency).
    pub fn find(&self, key: &K) -> Option<ConstAccessor<V>> {
        let entry = self.map.get(key)?.value().clone();
        let now = self.now_tick();
        let last = entry.last_use_tick.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= self.update_period.as_nanos() as u64 {
            let _ = entry.last_use_tick.compare_exchange(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
        Some(ConstAccessor { entry })
    }

    /// Publishes `value` under `key`. Returns `true` if newly inserted,
    /// `false` if the key was already present (no update is performed in
    /// that case — see §4.1). On insertion, evicts least-recently-used
    /// entries until the total weight is back within budget, unless the
    /// new value alone exceeds `max_weight`, in which case eviction stops
    /// once nothing else remains to evict.
    pub fn insert(&self, key: K, value: V) -> bool {
        let _guard = self.insert_lock.lock();
        if self.map.contains_key(&key) {
            return false;
        }

        let weight = value.cache_weight();
        let tick = self.now_tick();
        let entry = Arc::new(CacheEntry::new(Arc::new(value), weight, tick));
        self.map.insert(key.clone(), entry);
        self.total_weight.fetch_add(weight as u64, Ordering::AcqRel);

        self.evict_until_within_budget(&key);
        true
    }

    fn evict_until_within_budget(&self, just_inserted: &K) {
        while self.total_weight.load(Ordering::Acquire) > self.max_weight as u64 {
            let oldest = self
                .map
                .iter()
                .filter(|kv| kv.key() != just_inserted)
                .min_by_key(|kv| kv.value().last_use_tick.load(Ordering::Relaxed))
                .map(|kv| kv.key().clone());

            let Some(victim) = oldest else {
                // Nothing left to evict; either the new value alone
                // exceeds the budget, or it's the sole remaining entry.
                break;
            };

            if let Some((_, removed)) = self.map.remove(&victim) {
                self.total_weight
                    .fetch_sub(removed.weight as u64, Ordering::AcqRel);
                tracing::debug!(weight = removed.weight, "evicted cache entry");
            }
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Diagnostic: recomputes the total weight from scratch and compares it
    /// against the tracked atomic. Requires no concurrent `insert`/`find`;
    /// a read racing with the `map` iteration here can produce a false
    /// negative.
    pub fn unsafe_check_consistent(&self) -> bool {
        let recomputed: u64 = self.map.iter().map(|kv| kv.value().weight as u64).sum();
        recomputed == self.total_weight.load(Ordering::Acquire)
    }
}
