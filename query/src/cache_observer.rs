use crate::{QueryKey, QueryState};

/// Subscribing to cache events
pub trait CacheObserver {
    /// receive a cache event.
    fn process_cache_event(&self, event: CacheEvent);
}

impl<F> CacheObserver for F
where
    F: Fn(CacheEvent),
{
    fn process_cache_event(&self, event: CacheEvent) {
        self(event)
    }
}

/// The events that can be observed from the query cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A key was written for the first time.
    Added(QueryCacheKey),
    /// An existing entry was overwritten.
    Updated(UpdatedQuery),
    /// An entry left the cache.
    Removed {
        /// The removed key.
        key: QueryCacheKey,
        /// Why it was removed.
        cause: RemovalCause,
    },
    /// A subscriber started observing the key.
    ObserverAdded(QueryCacheKey),
    /// A subscriber stopped observing the key.
    ObserverRemoved(QueryCacheKey),
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Explicitly deleted or removed through a key prefix.
    Deleted,
    /// Pushed out by the size limit.
    Evicted,
    /// Unobserved for longer than its gc time.
    GarbageCollected,
    /// The whole cache was cleared or replaced.
    Cleared,
}

/// A query whose state changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedQuery {
    /// The key of the query.
    pub key: QueryCacheKey,
    /// The new state.
    pub state: QueryState,
}

/// A serialized key for a query in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryCacheKey(pub String);

impl QueryCacheKey {
    /// Parses the serialized key back into a [`QueryKey`].
    pub fn query_key(&self) -> QueryKey {
        QueryKey::from_serialized(&self.0)
    }
}

impl From<&str> for QueryCacheKey {
    fn from(key: &str) -> Self {
        QueryCacheKey(key.to_string())
    }
}

impl From<&QueryKey> for QueryCacheKey {
    fn from(key: &QueryKey) -> Self {
        QueryCacheKey(key.serialize())
    }
}

impl std::fmt::Display for QueryCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
