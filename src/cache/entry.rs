use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A value stored in an [`super::LruWeightCache`] must expose its own
/// budget cost. For `Varcode`, this is the intercode size rounded up to the
/// allocator's page granularity (§3, "Cache Entry").
pub trait CacheWeight {
    fn cache_weight(&self) -> u32;
}

/// One live mapping in the cache: the value, its charged weight, and the
/// coarse tick it was last touched at.
pub(crate) struct CacheEntry<V> {
    pub(crate) value: Arc<V>,
    pub(crate) weight: u32,
    pub(crate) last_use_tick: AtomicU64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: Arc<V>, weight: u32, tick: u64) -> Self {
        Self {
            value,
            weight,
            last_use_tick: AtomicU64::new(tick),
        }
    }
}
