use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
    rc::{Rc, Weak},
    time::Duration,
};

use lru::LruCache;
use slotmap::SlotMap;

use crate::{
    cache_observer::{CacheEvent, CacheObserver, QueryCacheKey, RemovalCause, UpdatedQuery},
    garbage_collector::GarbageCollector,
    instant::Clock,
    runtime::queue_microtask,
    Instant, QueryState,
};

/// Default upper bound on the number of cached entries.
pub const DEFAULT_MAX_QUERIES: usize = 1000;

/// Raw key to state map used to transfer a cache across an execution boundary.
pub type CacheSnapshot = BTreeMap<String, QueryState>;

type Listener = Rc<dyn Fn(&QueryState)>;

slotmap::new_key_type! {
    /// Identifies a change listener registered on a key.
    pub struct ListenerKey;
}

slotmap::new_key_type! {
    /// Identifies one subscription made with [`QueryCache::subscribe`].
    pub struct SubscriberKey;
}

slotmap::new_key_type! {
    struct CacheObserverKey;
}

/// Slot map whose entries are grouped by query key.
///
/// Slot keys are never handed out twice, so a handle left over from a deleted entry cannot
/// match a later registration on the same query key.
struct KeyedSlots<K: slotmap::Key, V> {
    slots: SlotMap<K, (String, V)>,
    by_key: HashMap<String, Vec<K>>,
}

impl<K: slotmap::Key, V> Default for KeyedSlots<K, V> {
    fn default() -> Self {
        Self {
            slots: SlotMap::with_key(),
            by_key: HashMap::new(),
        }
    }
}

impl<K: slotmap::Key, V> KeyedSlots<K, V> {
    fn insert(&mut self, key: &str, value: V) -> K {
        let slot = self.slots.insert((key.to_string(), value));
        self.by_key.entry(key.to_string()).or_default().push(slot);
        slot
    }

    /// Removes one slot, returning the query key it belonged to.
    fn remove(&mut self, slot: K) -> Option<String> {
        let (key, _) = self.slots.remove(slot)?;
        if let Some(slots) = self.by_key.get_mut(&key) {
            slots.retain(|other| *other != slot);
            if slots.is_empty() {
                self.by_key.remove(&key);
            }
        }
        Some(key)
    }

    fn remove_key(&mut self, key: &str) {
        for slot in self.by_key.remove(key).unwrap_or_default() {
            self.slots.remove(slot);
        }
    }

    fn first(&self, key: &str) -> Option<K> {
        self.by_key.get(key).and_then(|slots| slots.first().copied())
    }

    fn count(&self, key: &str) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a V> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|slot| self.slots.get(*slot).map(|(_, value)| value))
    }

    fn key_count(&self) -> usize {
        self.by_key.len()
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.by_key.clear();
    }
}

/// Bounded store of query states keyed by serialized query key.
///
/// Entries leave the cache in two ways: the least recently used entry is evicted once the
/// size limit is reached, and an entry nobody subscribes to is deleted when its gc timer fires.
/// Subscriber counts, listeners and gc timers are runtime metadata; they are dropped together
/// with their entry and are never part of a [snapshot](QueryCache::serialize).
///
/// Listeners are notified on a later turn of the executor, once per key, no matter how many
/// writes happened in between.
#[derive(Clone)]
pub struct QueryCache {
    inner: Rc<CacheInner>,
}

struct CacheInner {
    entries: RefCell<LruCache<String, QueryState>>,
    max_size: usize,
    subscribers: RefCell<KeyedSlots<SubscriberKey, ()>>,
    listeners: RefCell<KeyedSlots<ListenerKey, Listener>>,
    gc: RefCell<GarbageCollector>,
    pending: RefCell<Vec<String>>,
    flush_scheduled: Cell<bool>,
    observers: RefCell<SlotMap<CacheObserverKey, Rc<dyn CacheObserver>>>,
    clock: Clock,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.gc.get_mut().cancel_all();
    }
}

/// Counters describing the cache, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries.
    pub size: usize,
    /// Configured entry limit.
    pub max_size: usize,
    /// Keys with at least one subscriber.
    pub subscribed_keys: usize,
    /// Keys with at least one listener.
    pub listened_keys: usize,
    /// Pending gc timers.
    pub active_gc_timers: usize,
}

/// Returned by [`QueryCache::subscribe_listener`].
pub struct ListenerSubscription {
    cache: Weak<CacheInner>,
    key: String,
    listener: ListenerKey,
}

impl ListenerSubscription {
    /// Removes the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.cache.upgrade() {
            inner.listeners.borrow_mut().remove(self.listener);
        }
    }
}

impl std::fmt::Debug for ListenerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSubscription")
            .field("key", &self.key)
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERIES)
    }
}

impl QueryCache {
    /// Creates a cache holding at most `max_queries` entries. A limit of zero is raised to one.
    pub fn new(max_queries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_queries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Rc::new(CacheInner {
                entries: RefCell::new(LruCache::new(capacity)),
                max_size: capacity.get(),
                subscribers: RefCell::default(),
                listeners: RefCell::default(),
                gc: RefCell::new(GarbageCollector::default()),
                pending: RefCell::new(Vec::new()),
                flush_scheduled: Cell::new(false),
                observers: RefCell::new(SlotMap::with_key()),
                clock: Clock::new(),
            }),
        }
    }

    /// Current time on the cache's clock.
    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// Inserting a new key into a full cache evicts the least recently used entry together with
    /// its metadata. Listeners of `key` are notified on the next turn.
    pub fn set(&self, key: &str, state: QueryState) {
        let (existed, evicted) = {
            let mut entries = self.inner.entries.borrow_mut();
            if entries.contains(key) {
                entries.put(key.to_string(), state.clone());
                (true, None)
            } else {
                let evicted = entries
                    .push(key.to_string(), state.clone())
                    .map(|(evicted, _)| evicted)
                    .filter(|evicted| evicted != key);
                (false, evicted)
            }
        };
        tracing::trace!(key, is_fetching = state.is_fetching, "cache write");

        if let Some(evicted) = evicted {
            tracing::debug!(key = %evicted, "evicted least recently used query");
            self.inner.remove_metadata(&evicted);
            self.inner.notify_observers(CacheEvent::Removed {
                key: QueryCacheKey(evicted),
                cause: RemovalCause::Evicted,
            });
        }

        CacheInner::schedule_notify(&self.inner, key);

        let event = if existed {
            CacheEvent::Updated(UpdatedQuery {
                key: QueryCacheKey::from(key),
                state,
            })
        } else {
            CacheEvent::Added(QueryCacheKey::from(key))
        };
        self.inner.notify_observers(event);
    }

    /// Returns the entry for `key` and marks it as recently used.
    pub fn get(&self, key: &str) -> Option<QueryState> {
        self.inner.entries.borrow_mut().get(key).cloned()
    }

    /// Returns the entry for `key` without touching its recency.
    pub fn peek(&self, key: &str) -> Option<QueryState> {
        self.inner.entries.borrow().peek(key).cloned()
    }

    /// Whether `key` has an entry.
    pub fn has(&self, key: &str) -> bool {
        self.inner.entries.borrow().contains(key)
    }

    /// Removes the entry and all metadata for `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key, RemovalCause::Deleted)
    }

    /// Removes every entry and all metadata, cancelling pending gc timers.
    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut entries = self.inner.entries.borrow_mut();
            let keys = entries.iter().map(|(key, _)| key.clone()).collect();
            entries.clear();
            keys
        };
        self.inner.subscribers.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
        self.inner.gc.borrow_mut().cancel_all();
        self.inner.pending.borrow_mut().clear();
        tracing::debug!(removed = keys.len(), "cleared query cache");

        for key in keys {
            self.inner.notify_observers(CacheEvent::Removed {
                key: QueryCacheKey(key),
                cause: RemovalCause::Cleared,
            });
        }
    }

    /// Snapshot of every entry. Recency is not affected.
    pub fn get_all(&self) -> BTreeMap<String, QueryState> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(key, state)| (key.clone(), state.clone()))
            .collect()
    }

    /// Registers a change listener for `key`.
    pub fn subscribe_listener(
        &self,
        key: &str,
        listener: impl Fn(&QueryState) + 'static,
    ) -> ListenerSubscription {
        let listener = self
            .inner
            .listeners
            .borrow_mut()
            .insert(key, Rc::new(listener));
        ListenerSubscription {
            cache: Rc::downgrade(&self.inner),
            key: key.to_string(),
            listener,
        }
    }

    /// Adds a subscriber to `key`, cancelling any pending gc timer.
    ///
    /// The returned handle can be passed to [`release`](Self::release). It stops counting once
    /// the entry is deleted, so releasing it afterwards never affects later subscribers.
    pub fn subscribe(&self, key: &str) -> SubscriberKey {
        let subscriber = self.inner.subscribers.borrow_mut().insert(key, ());
        if self.inner.gc.borrow_mut().cancel(key) {
            tracing::trace!(key, "gc cancelled by new subscriber");
        }
        self.inner
            .notify_observers(CacheEvent::ObserverAdded(QueryCacheKey::from(key)));
        subscriber
    }

    /// Removes a subscriber from `key`.
    ///
    /// When the last subscriber leaves, the entry is deleted after `gc_time` unless someone
    /// subscribes again first. `None` keeps the entry until it is evicted or deleted.
    pub fn unsubscribe(&self, key: &str, gc_time: Option<Duration>) {
        let subscriber = self.inner.subscribers.borrow().first(key);
        if let Some(subscriber) = subscriber {
            self.inner.subscribers.borrow_mut().remove(subscriber);
        }
        self.after_unsubscribe(key, gc_time);
    }

    /// Removes the subscription behind `subscriber`, like [`unsubscribe`](Self::unsubscribe).
    ///
    /// A handle whose entry was deleted, cleared or evicted since is ignored.
    pub fn release(&self, subscriber: SubscriberKey, gc_time: Option<Duration>) {
        let key = self.inner.subscribers.borrow_mut().remove(subscriber);
        match key {
            Some(key) => self.after_unsubscribe(&key, gc_time),
            None => tracing::trace!(?subscriber, "released subscription of a removed entry"),
        }
    }

    fn after_unsubscribe(&self, key: &str, gc_time: Option<Duration>) {
        self.inner
            .notify_observers(CacheEvent::ObserverRemoved(QueryCacheKey::from(key)));
        if self.subscriber_count(key) == 0 {
            self.schedule_gc(key, gc_time);
        }
    }

    /// Starts a gc timer for an entry that has no subscribers, such as a prefetched entry.
    pub(crate) fn schedule_gc_if_unobserved(&self, key: &str, gc_time: Option<Duration>) {
        if self.subscriber_count(key) == 0 {
            self.schedule_gc(key, gc_time);
        }
    }

    fn schedule_gc(&self, key: &str, gc_time: Option<Duration>) {
        let Some(gc_time) = gc_time else {
            return;
        };
        if !self.has(key) {
            return;
        }

        let cache = Rc::downgrade(&self.inner);
        let owned_key = key.to_string();
        self.inner.gc.borrow_mut().schedule(
            key,
            gc_time,
            move || {
                if let Some(inner) = cache.upgrade() {
                    inner.gc.borrow_mut().forget(&owned_key);
                    let observed = inner.subscribers.borrow().count(&owned_key) > 0;
                    if !observed {
                        tracing::debug!(key = %owned_key, "garbage collecting query");
                        inner.remove(&owned_key, RemovalCause::GarbageCollected);
                    }
                }
            },
        );
        tracing::trace!(key, ?gc_time, "gc scheduled");
    }

    /// Number of subscribers of `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.subscribers.borrow().count(key)
    }

    /// Copies the raw entries, without any metadata.
    pub fn serialize(&self) -> CacheSnapshot {
        self.get_all()
    }

    /// Replaces the cache contents with `snapshot`.
    ///
    /// All existing entries and metadata are dropped first; subscriptions, listeners and gc
    /// timers have to be re-established by new subscribers.
    pub fn deserialize(&self, snapshot: CacheSnapshot) {
        self.clear();
        for (key, state) in snapshot {
            self.set(&key, state);
        }
    }

    /// Size and metadata counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.inner.entries.borrow().len(),
            max_size: self.inner.max_size,
            subscribed_keys: self.inner.subscribers.borrow().key_count(),
            listened_keys: self.inner.listeners.borrow().key_count(),
            active_gc_timers: self.inner.gc.borrow().len(),
        }
    }

    /// Registers an observer of cache-wide events.
    pub fn register_observer(&self, observer: impl CacheObserver + 'static) {
        self.inner.observers.borrow_mut().insert(Rc::new(observer));
    }

    #[cfg(test)]
    pub(crate) fn has_gc_timer(&self, key: &str) -> bool {
        self.inner.gc.borrow().is_scheduled(key)
    }
}

impl CacheInner {
    fn remove(&self, key: &str, cause: RemovalCause) -> bool {
        let removed = self.entries.borrow_mut().pop(key).is_some();
        self.remove_metadata(key);
        if removed {
            self.notify_observers(CacheEvent::Removed {
                key: QueryCacheKey::from(key),
                cause,
            });
        }
        removed
    }

    fn remove_metadata(&self, key: &str) {
        self.subscribers.borrow_mut().remove_key(key);
        self.listeners.borrow_mut().remove_key(key);
        self.gc.borrow_mut().cancel(key);
        self.pending.borrow_mut().retain(|pending| pending != key);
    }

    fn schedule_notify(inner: &Rc<CacheInner>, key: &str) {
        {
            let mut pending = inner.pending.borrow_mut();
            if !pending.iter().any(|pending| pending == key) {
                pending.push(key.to_string());
            }
        }
        if inner.flush_scheduled.replace(true) {
            return;
        }
        let cache = Rc::downgrade(inner);
        queue_microtask(move || {
            if let Some(inner) = cache.upgrade() {
                inner.flush();
            }
        });
    }

    fn flush(&self) {
        self.flush_scheduled.set(false);
        let keys = std::mem::take(&mut *self.pending.borrow_mut());
        for key in keys {
            let Some(state) = self.entries.borrow().peek(&key).cloned() else {
                continue;
            };
            let listeners: Vec<Listener> = self.listeners.borrow().values(&key).cloned().collect();
            tracing::trace!(key, listeners = listeners.len(), "notifying listeners");
            for listener in listeners {
                listener(&state);
            }
        }
    }

    fn notify_observers(&self, event: CacheEvent) {
        let observers: Vec<Rc<dyn CacheObserver>> =
            self.observers.borrow().values().cloned().collect();
        for observer in observers {
            observer.process_cache_event(event.clone());
        }
    }
}
