use crate::cache::entry::CacheEntry;
use std::sync::Arc;

/// Scoped read-guard returned by [`super::LruWeightCache::find`]. Holding
/// one keeps its value alive even if the cache concurrently evicts the key
/// it was found under (§4.1, "accessor safety") — the guard owns a clone of
/// the entry's `Arc`, not a reference into the map.
pub struct ConstAccessor<V> {
    pub(crate) entry: Arc<CacheEntry<V>>,
}

impl<V> std::ops::Deref for ConstAccessor<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.entry.value
    }
}

impl<V> Clone for ConstAccessor<V> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<V> ConstAccessor<V> {
    /// Clones out the underlying `Arc<V>`, for callers that need to hold
    /// the value beyond the accessor's own lifetime (e.g. publishing a
    /// nativecode slot from a worker thread after the lookup that found it
    /// has gone out of scope).
    pub fn shared(&self) -> Arc<V> {
        Arc::clone(&self.entry.value)
    }
}
