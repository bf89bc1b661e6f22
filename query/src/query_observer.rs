use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use slotmap::{new_key_type, SlotMap};

use crate::{
    options_manager::{OptionsChange, OptionsManager},
    placeholder::PlaceholderManager,
    query_cache::{ListenerSubscription, SubscriberKey},
    query_executor::{FetchManager, OnComplete},
    query_result::should_notify,
    result_computer::compute_result,
    runtime::{queue_microtask, set_timeout, TimeoutHandle},
    structural_sharing::replace_equal_deep_opt,
    QueryClient, QueryOptions, QueryResult, QueryState, Refetch, ResultField, TrackedResult,
};

new_key_type! {
    /// Identifies a listener registered with [`QueryObserver::subscribe`].
    pub struct ObserverListenerKey;
}

type Listener = Rc<dyn Fn(&TrackedResult)>;

/// One subscription to one query.
///
/// The observer keeps its key subscribed in the cache, fetches when the cached data is missing
/// or stale, refetches invalidated data, and tells its listeners when the result changes. Which
/// changes count is decided by the fields read from the [`TrackedResult`].
///
/// Listeners run on a later turn than the cache write that caused them, and several writes in
/// one turn produce one notification.
///
/// Clones share the same subscription. [`destroy`](QueryObserver::destroy) (or dropping the
/// last clone) releases it.
#[derive(Clone)]
pub struct QueryObserver {
    inner: Rc<ObserverInner>,
}

struct ObserverInner {
    id: ObserverKey,
    this: Weak<ObserverInner>,
    fetcher: FetchManager,
    options: RefCell<QueryOptions>,
    cache_key: RefCell<String>,
    options_manager: RefCell<OptionsManager>,
    placeholder: RefCell<PlaceholderManager>,
    result: RefCell<Option<Rc<QueryResult>>>,
    tracked: Rc<RefCell<HashSet<ResultField>>>,
    listeners: RefCell<SlotMap<ObserverListenerKey, Listener>>,
    cache_subscription: RefCell<Option<ListenerSubscription>>,
    subscriber: Cell<Option<SubscriberKey>>,
    refetch_timer: RefCell<Option<TimeoutHandle>>,
    notify_scheduled: Cell<bool>,
    destroyed: Cell<bool>,
}

impl std::fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("id", &self.inner.id)
            .field("key", &self.inner.cache_key.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

impl QueryObserver {
    /// Starts observing `options.key` in `client`'s cache.
    pub fn new(client: &QueryClient, options: QueryOptions) -> Self {
        Self::with_fetcher(client.fetcher().clone(), options)
    }

    pub(crate) fn with_fetcher(fetcher: FetchManager, options: QueryOptions) -> Self {
        let options = options.validate();
        let cache_key = options.cache_key();
        let inner = Rc::new_cyclic(|this| ObserverInner {
            id: next_id(),
            this: this.clone(),
            fetcher,
            options_manager: RefCell::new(OptionsManager::new(&options)),
            options: RefCell::new(options),
            cache_key: RefCell::new(cache_key),
            placeholder: RefCell::new(PlaceholderManager::default()),
            result: RefCell::new(None),
            tracked: Rc::new(RefCell::new(HashSet::new())),
            listeners: RefCell::new(SlotMap::with_key()),
            cache_subscription: RefCell::new(None),
            subscriber: Cell::new(None),
            refetch_timer: RefCell::new(None),
            notify_scheduled: Cell::new(false),
            destroyed: Cell::new(false),
        });
        tracing::debug!(id = ?inner.id, key = %inner.cache_key.borrow(), "observer created");

        inner.attach();
        inner.execute_fetch();
        inner.update_result(false);
        inner.start_refetch_interval();
        QueryObserver { inner }
    }

    /// The latest result, wrapped so that reads are tracked.
    pub fn get_current_result(&self) -> TrackedResult {
        let result = self
            .inner
            .result
            .borrow()
            .clone()
            .unwrap_or_else(|| Rc::new(QueryResult::idle(self.inner.refetch_handle())));
        TrackedResult::new(result, self.inner.tracked.clone())
    }

    /// Registers a listener for result changes.
    pub fn subscribe(&self, listener: impl Fn(&TrackedResult) + 'static) -> ObserverListenerKey {
        self.inner.listeners.borrow_mut().insert(Rc::new(listener))
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, key: ObserverListenerKey) -> bool {
        self.inner.listeners.borrow_mut().remove(key).is_some()
    }

    /// Fetches now, regardless of staleness.
    pub fn refetch(&self) {
        self.inner.refetch();
    }

    /// Replaces the options.
    ///
    /// Function valued options (query function, schema, select, placeholder) are swapped in
    /// place. A change of timing, enablement, URL or params re-evaluates whether to fetch. A
    /// change of key moves the subscription to the new key.
    pub fn set_options(&self, options: QueryOptions) {
        self.inner.set_options(options);
    }

    /// The current options.
    pub fn options(&self) -> QueryOptions {
        self.inner.options.borrow().clone()
    }

    /// The serialized key being observed.
    pub fn cache_key(&self) -> String {
        self.inner.cache_key.borrow().clone()
    }

    /// Releases the subscription. The key's gc timer starts if this was its last subscriber.
    /// Further calls, and fetches that complete afterwards, are ignored.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Whether [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl ObserverInner {
    fn attach(&self) {
        let key = self.cache_key.borrow().clone();
        let cache = self.fetcher.cache();
        self.subscriber.set(Some(cache.subscribe(&key)));

        let this = self.this.clone();
        let subscription = cache.subscribe_listener(&key, move |state: &QueryState| {
            if let Some(inner) = this.upgrade() {
                inner.on_cache_change(state);
            }
        });
        if let Some(previous) = self.cache_subscription.replace(Some(subscription)) {
            previous.unsubscribe();
        }
    }

    fn detach(&self, gc_time: Option<Duration>) {
        if let Some(subscription) = self.cache_subscription.take() {
            subscription.unsubscribe();
        }
        if let Some(subscriber) = self.subscriber.take() {
            self.fetcher.cache().release(subscriber, gc_time);
        }
    }

    fn on_cache_change(&self, state: &QueryState) {
        if self.destroyed.get() {
            return;
        }

        // Invalidation asks active observers to refetch, not only to mark the data stale.
        let invalidated = state.is_invalidated()
            && state.has_settled()
            && !state.is_fetching
            && !state.is_loading;
        if invalidated {
            let options = self.options.borrow().clone();
            let key = self.cache_key.borrow().clone();
            if options.is_enabled() && !self.fetcher.is_fetching(&key) {
                tracing::debug!(id = ?self.id, key, "refetching invalidated query");
                self.fetcher.fetch_data(&options, Some(self.on_complete()));
            }
        }

        self.update_result(true);
    }

    fn execute_fetch(&self) {
        let options = self.options.borrow().clone();
        self.fetcher.execute_fetch(&options, Some(self.on_complete()));
    }

    fn refetch(&self) {
        if self.destroyed.get() {
            return;
        }
        let options = self.options.borrow().clone();
        self.fetcher.fetch_data(&options, Some(self.on_complete()));
        self.update_result(true);
    }

    /// Runs after a fetch started by this observer has written its result.
    fn on_complete(&self) -> OnComplete {
        let this = self.this.clone();
        let key = self.cache_key.borrow().clone();
        Rc::new(move || {
            let Some(inner) = this.upgrade() else {
                return;
            };
            if inner.destroyed.get() || *inner.cache_key.borrow() != key {
                return;
            }
            inner.placeholder.borrow_mut().deactivate();
            inner.update_result(true);
        })
    }

    fn refetch_handle(&self) -> Refetch {
        let this = self.this.clone();
        Refetch(Rc::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.refetch();
            }
        }))
    }

    /// Recomputes the result. Listeners are notified on a later turn if a field they depend on
    /// changed and `notify` is set.
    fn update_result(&self, notify: bool) {
        if self.destroyed.get() {
            return;
        }
        let options = self.options.borrow().clone();
        let mut next = compute_result(
            self.fetcher.cache(),
            &options,
            &mut self.placeholder.borrow_mut(),
            self.refetch_handle(),
        );

        let previous = self.result.borrow().clone();
        if let Some(previous) = &previous {
            next.data = replace_equal_deep_opt(previous.data.as_ref(), next.data.take());
        }
        let changed = should_notify(previous.as_deref(), &next, &self.tracked.borrow());
        *self.result.borrow_mut() = Some(Rc::new(next));

        if changed && notify {
            self.schedule_notify();
        }
    }

    fn schedule_notify(&self) {
        if self.notify_scheduled.replace(true) {
            return;
        }
        let this = self.this.clone();
        queue_microtask(move || {
            let Some(inner) = this.upgrade() else {
                return;
            };
            inner.notify_scheduled.set(false);
            if inner.destroyed.get() {
                return;
            }
            let Some(result) = inner.result.borrow().clone() else {
                return;
            };
            let view = TrackedResult::new(result, inner.tracked.clone());
            let listeners: Vec<Listener> = inner.listeners.borrow().values().cloned().collect();
            tracing::trace!(id = ?inner.id, listeners = listeners.len(), "notifying observer listeners");
            for listener in listeners {
                listener(&view);
            }
        });
    }

    fn set_options(&self, options: QueryOptions) {
        if self.destroyed.get() {
            return;
        }
        let options = options.validate();
        let previous = self.options.replace(options.clone());
        let change = self
            .options_manager
            .borrow_mut()
            .update(&previous, &options);

        match change {
            OptionsChange::Unchanged => {}
            OptionsChange::Updated => {
                self.execute_fetch();
                self.start_refetch_interval();
            }
            OptionsChange::KeyChanged {
                previous_key,
                previous_gc_time,
            } => {
                tracing::debug!(id = ?self.id, from = previous_key, to = %options.key, "observer key changed");
                self.detach(previous_gc_time);
                self.placeholder.borrow_mut().deactivate();
                *self.cache_key.borrow_mut() = options.cache_key();
                self.attach();
                self.execute_fetch();
                self.start_refetch_interval();
            }
        }
        self.update_result(true);
    }

    fn start_refetch_interval(&self) {
        if let Some(handle) = self.refetch_timer.take() {
            handle.clear();
        }
        let interval = {
            let options = self.options.borrow();
            match options.refetch_interval {
                Some(interval) if options.is_enabled() => interval,
                _ => return,
            }
        };

        let this = self.this.clone();
        let handle = set_timeout(
            move || {
                let Some(inner) = this.upgrade() else {
                    return;
                };
                if inner.destroyed.get() {
                    return;
                }
                let key = inner.cache_key.borrow().clone();
                if !inner.fetcher.is_fetching(&key) {
                    tracing::trace!(id = ?inner.id, key, "refetch interval elapsed");
                    let options = inner.options.borrow().clone();
                    inner.fetcher.fetch_data(&options, Some(inner.on_complete()));
                }
                inner.start_refetch_interval();
            },
            interval,
        );
        *self.refetch_timer.borrow_mut() = Some(handle);
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        let key = self.cache_key.borrow().clone();
        let gc_time = self.options.borrow().gc_time;
        tracing::debug!(id = ?self.id, key, "observer destroyed");

        self.detach(gc_time);
        if let Some(handle) = self.refetch_timer.take() {
            handle.clear();
        }
        self.listeners.borrow_mut().clear();
        self.placeholder.borrow_mut().deactivate();
        self.result.borrow_mut().take();
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        self.destroy();
    }
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObserverKey(u32);

fn next_id() -> ObserverKey {
    ObserverKey(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http_client::mock::MockHttp, query_key, runtime::test_util::*, Instant, QueryCache,
        QueryError, Value,
    };
    use serde_json::json;

    struct Harness {
        fetcher: FetchManager,
        calls: Rc<Cell<usize>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                fetcher: FetchManager::new(QueryCache::default(), Rc::new(MockHttp::default())),
                calls: Rc::new(Cell::new(0)),
            }
        }

        fn cache(&self) -> &QueryCache {
            self.fetcher.cache()
        }

        /// A query that takes 100ms and answers `{"id": .., "name": "A", "fetch": n}`.
        fn user_options(&self, id: i64) -> QueryOptions {
            let calls = self.calls.clone();
            QueryOptions::query_fn(query_key!["user", id], move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.set(calls.get() + 1);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(Value::from(json!({
                        "id": id,
                        "profile": {"name": "A"},
                        "fetch": calls.get(),
                    })))
                }
            })
            .set_stale_time(Some(Duration::from_millis(5000)))
        }

        fn observe(&self, options: QueryOptions) -> QueryObserver {
            QueryObserver::with_fetcher(self.fetcher.clone(), options)
        }
    }

    async fn settle(ms: u64) {
        flush().await;
        tokio::time::advance(Duration::from_millis(ms)).await;
        flush().await;
    }

    fn notifications(observer: &QueryObserver) -> Rc<RefCell<Vec<QueryResult>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        observer.subscribe({
            let seen = seen.clone();
            move |result: &TrackedResult| seen.borrow_mut().push(result.untracked().clone())
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn loads_then_succeeds() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1));

            let result = observer.get_current_result();
            assert!(result.is_loading() && result.is_fetching());
            let seen = notifications(&observer);

            settle(100).await;
            let result = observer.get_current_result();
            assert!(result.is_success());
            assert_eq!(
                result.data().and_then(|d| d.get("id")).and_then(Value::as_i64),
                Some(1)
            );
            assert_eq!(seen.borrow().len(), 1);
            assert_eq!(harness.calls.get(), 1);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_hit_does_not_fetch_but_stale_does() {
        run_local(async {
            let harness = Harness::new();
            let first = harness.observe(harness.user_options(1));
            settle(100).await;
            assert_eq!(harness.calls.get(), 1);

            tokio::time::advance(Duration::from_millis(3000)).await;
            let second = harness.observe(harness.user_options(1));
            let result = second.get_current_result();
            assert!(!result.is_fetching());
            assert!(result.data().is_some());
            flush().await;
            assert_eq!(harness.calls.get(), 1);

            tokio::time::advance(Duration::from_millis(3000)).await;
            let third = harness.observe(harness.user_options(1));
            let result = third.get_current_result();
            assert!(result.is_fetching() && !result.is_loading());
            assert!(result.data().is_some());
            flush().await;
            assert_eq!(harness.calls.get(), 2);

            first.destroy();
            second.destroy();
            third.destroy();
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn shared_key_fetches_once() {
        run_local(async {
            let harness = Harness::new();
            let a = harness.observe(harness.user_options(1));
            let b = harness.observe(harness.user_options(1));
            settle(100).await;
            assert_eq!(harness.calls.get(), 1);
            assert_eq!(harness.cache().subscriber_count(&a.cache_key()), 2);
            assert!(b.get_current_result().is_success());
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_triggers_exactly_one_refetch() {
        run_local(async {
            let harness = Harness::new();
            let a = harness.observe(harness.user_options(1));
            let _b = harness.observe(harness.user_options(1));
            settle(100).await;
            assert_eq!(harness.calls.get(), 1);

            let key = a.cache_key();
            let state = harness.cache().get(&key).unwrap();
            harness.cache().set(&key, state.invalidated());

            settle(100).await;
            settle(100).await;
            assert_eq!(harness.calls.get(), 2);
            let result = a.get_current_result();
            assert!(!result.is_stale() && !result.is_fetching());
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_refetch_keeps_references() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1));
            settle(100).await;
            let before = observer.get_current_result().untracked().data.clone().unwrap();

            observer.refetch();
            settle(100).await;
            let after = observer.get_current_result().untracked().data.clone().unwrap();

            assert!(!after.ptr_eq(&before));
            assert_eq!(after.get("fetch").and_then(Value::as_i64), Some(2));
            assert!(after
                .get("profile")
                .unwrap()
                .ptr_eq(before.get("profile").unwrap()));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_field_changes_do_not_notify() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1));
            settle(100).await;

            let profile = |result: &TrackedResult| {
                result.data().and_then(|data| data.get("profile")).cloned()
            };
            let seen = Rc::new(Cell::new(0));
            observer.subscribe({
                let seen = seen.clone();
                move |result: &TrackedResult| {
                    seen.set(seen.get() + 1);
                    let _ = result.untracked();
                }
            });
            let current = observer.get_current_result();
            current.track_fields([ResultField::IsError]);

            observer.refetch();
            settle(100).await;
            assert_eq!(seen.get(), 0, "is_fetching and data were not tracked");
            assert!(profile(&observer.get_current_result()).is_some());

            harness.cache().set(
                &observer.cache_key(),
                QueryState {
                    error: Some(QueryError::fetch("down")),
                    ..harness.cache().peek(&observer.cache_key()).unwrap()
                },
            );
            flush().await;
            assert_eq!(seen.get(), 1);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_listener_hears_identical_writes() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1));
            settle(100).await;
            let seen = notifications(&observer);

            let key = observer.cache_key();
            let state = harness.cache().peek(&key).unwrap();
            harness.cache().set(&key, state);
            flush().await;
            assert_eq!(seen.borrow().len(), 1);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_from_sibling() {
        run_local(async {
            let harness = Harness::new();
            harness.cache().set(
                &query_key!["user", 1].serialize(),
                QueryState::with_data(Value::from(json!({"name": "A"})), Instant::from_millis(100)),
            );
            let options = harness.user_options(2).set_placeholder_fn(|prev, _| {
                prev.get("name")
                    .map(|name| Value::object([("name", name.clone())]))
            });
            let observer = harness.observe(options);

            let result = observer.get_current_result();
            assert!(result.is_placeholder_data());
            assert!(result.is_fetching() && !result.is_loading());
            assert_eq!(result.data(), Some(&Value::from(json!({"name": "A"}))));

            settle(100).await;
            let result = observer.get_current_result();
            assert!(!result.is_placeholder_data());
            assert_eq!(
                result.data().and_then(|d| d.get("id")).and_then(Value::as_i64),
                Some(2)
            );
            let cached = harness.cache().peek(&observer.cache_key()).unwrap();
            assert_eq!(cached.data.and_then(|d| d.get("name").cloned()), None);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_observer_does_not_fetch() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1).set_enabled(false));
            let result = observer.get_current_result();
            assert!(!result.is_loading() && !result.is_fetching());
            settle(100).await;
            assert_eq!(harness.calls.get(), 0);

            observer.set_options(harness.user_options(1));
            assert!(observer.get_current_result().is_loading());
            settle(100).await;
            assert_eq!(harness.calls.get(), 1);
            assert!(observer.get_current_result().is_success());
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn key_change_moves_subscription() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(
                harness
                    .user_options(1)
                    .set_gc_time(Some(Duration::from_millis(1000))),
            );
            settle(100).await;
            let old_key = observer.cache_key();

            observer.set_options(harness.user_options(2));
            assert_eq!(harness.cache().subscriber_count(&old_key), 0);
            assert!(harness.cache().has_gc_timer(&old_key));
            assert_eq!(harness.cache().subscriber_count(&observer.cache_key()), 1);
            assert!(observer.get_current_result().is_loading());

            settle(100).await;
            assert_eq!(harness.calls.get(), 2);
            settle(1000).await;
            assert!(!harness.cache().has(&old_key));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn destroying_observer_of_deleted_entry_keeps_new_observer() {
        run_local(async {
            let harness = Harness::new();
            let options = harness
                .user_options(1)
                .set_gc_time(Some(Duration::from_millis(500)));
            let old = harness.observe(options.clone());
            settle(100).await;
            let key = old.cache_key();

            harness.cache().delete(&key);
            let now = harness.cache().now();
            harness.cache().set(&key, QueryState::with_data(Value::from(1), now));
            let current = harness.observe(options);
            old.destroy();

            assert_eq!(harness.cache().subscriber_count(&key), 1);
            assert_eq!(harness.cache().stats().listened_keys, 1);
            assert!(!harness.cache().has_gc_timer(&key));

            let now = harness.cache().now();
            harness.cache().set(&key, QueryState::with_data(Value::from(3), now));
            flush().await;
            assert_eq!(current.get_current_result().data(), Some(&Value::from(3)));

            settle(1000).await;
            assert!(harness.cache().has(&key));
            assert_eq!(harness.calls.get(), 1);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_options_swap_select_in_place() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(harness.user_options(1));
            settle(100).await;

            observer.set_options(
                harness
                    .user_options(1)
                    .set_select(|data| Ok(data.get("id").cloned().unwrap_or_default())),
            );
            assert_eq!(observer.get_current_result().data(), Some(&Value::from(1)));
            flush().await;
            assert_eq!(harness.calls.get(), 1);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_starts_gc_and_ignores_late_fetches() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(
                harness
                    .user_options(1)
                    .set_gc_time(Some(Duration::from_millis(500))),
            );
            flush().await;
            let seen = notifications(&observer);
            observer.destroy();
            observer.destroy();

            settle(100).await;
            assert!(seen.borrow().is_empty());
            assert!(observer.is_destroyed());
            let key = observer.cache_key();
            assert!(harness.cache().peek(&key).is_some_and(|s| s.data.is_some()));
            assert_eq!(harness.cache().stats().listened_keys, 0);

            settle(600).await;
            assert!(!harness.cache().has(&key));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_interval_polls() {
        run_local(async {
            let harness = Harness::new();
            let observer = harness.observe(
                harness
                    .user_options(1)
                    .set_refetch_interval(Some(Duration::from_millis(1000))),
            );
            settle(100).await;
            assert_eq!(harness.calls.get(), 1);

            settle(900).await;
            settle(100).await;
            assert_eq!(harness.calls.get(), 2);

            observer.destroy();
            settle(5000).await;
            assert_eq!(harness.calls.get(), 2);
        })
        .await
    }
}
