use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    cache_observer::CacheObserver,
    http_client::HttpClient,
    query_executor::{is_query_load_suppressed, FetchManager},
    structural_sharing::replace_equal_deep_opt,
    util::is_stale,
    CacheStats, DefaultQueryOptions, MutationObserver, MutationOptions, QueryCache, QueryError,
    QueryKey, QueryObserver, QueryOptions, QueryState, ReqwestClient, Value, DEFAULT_MAX_QUERIES,
};

thread_local! {
    static DEFAULT_CLIENT: RefCell<DefaultClient> = RefCell::new(DefaultClient::default());
}

#[derive(Default)]
struct DefaultClient {
    factory: Option<Rc<dyn Fn() -> QueryClient>>,
    instance: Option<QueryClient>,
}

/// Sets how the process default client is created.
///
/// The factory runs lazily on the next [`use_query_client`] call. A client created by an
/// earlier factory is dropped.
pub fn configure_query_client(factory: impl Fn() -> QueryClient + 'static) {
    DEFAULT_CLIENT.with(|client| {
        let mut client = client.borrow_mut();
        client.factory = Some(Rc::new(factory));
        client.instance = None;
    });
}

/// Retrieves the process default client, creating it on first use.
///
/// With the `ssr` feature every call returns a fresh client, so requests served by one
/// thread never share cached data.
pub fn use_query_client() -> QueryClient {
    let (instance, factory) = DEFAULT_CLIENT.with(|client| {
        let client = client.borrow();
        (client.instance.clone(), client.factory.clone())
    });

    if cfg!(feature = "ssr") {
        return factory.map(|factory| factory()).unwrap_or_default();
    }
    if let Some(instance) = instance {
        return instance;
    }
    let client = factory.map(|factory| factory()).unwrap_or_default();
    DEFAULT_CLIENT.with(|default| default.borrow_mut().instance = Some(client.clone()));
    client
}

/// Forgets the default client and its factory.
pub fn reset_query_client() {
    DEFAULT_CLIENT.with(|client| {
        let mut client = client.borrow_mut();
        client.factory = None;
        client.instance = None;
    });
}

/// Defaults of the process default client, if one was configured or created.
pub(crate) fn configured_default_options() -> Option<DefaultQueryOptions> {
    let configured = DEFAULT_CLIENT.with(|client| {
        let client = client.borrow();
        client.instance.is_some() || client.factory.is_some()
    });
    configured.then(|| use_query_client().default_options())
}

/// The Cache Client to store query data.
/// Exposes utility functions to manage queries.
///
/// Queries can be:
/// - [Observed](Self::observe)
///     - Keeps the query cached, fetched and up to date while the observer lives.
/// - [Prefetched](Self::prefetch_query)
///     - Query will start loading before anyone observes it.
/// - [Invalidated](Self::invalidate_queries)
///     - Query will refetch on next usage. Active queries are immediately refetched in the background.
/// - [Introspected](Self::get_query_state)
///     - Let's you see what the current value is of a query is.
/// - [Manually updated](Self::set_query_data)
///     - Useful when you have updated a value and you want to manually set it in cache instead of waiting for query to refetch.
/// - [Dehydrated](Self::dehydrate) and [hydrated](Self::hydrate)
///     - Transfers settled queries to another client, such as from a server render to the browser.
#[derive(Clone)]
pub struct QueryClient {
    cache: QueryCache,
    fetcher: FetchManager,
    default_options: DefaultQueryOptions,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("default_options", &self.default_options)
            .field("stats", &self.cache.stats())
            .finish()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`QueryClient`].
pub struct QueryClientBuilder {
    default_options: DefaultQueryOptions,
    max_queries: usize,
    http_client: Option<Rc<dyn HttpClient>>,
}

impl QueryClientBuilder {
    /// Options new queries start from.
    pub fn default_options(self, default_options: DefaultQueryOptions) -> Self {
        Self {
            default_options,
            ..self
        }
    }

    /// Upper bound on the number of cached queries. Default is 1000.
    pub fn max_queries(self, max_queries: usize) -> Self {
        Self {
            max_queries,
            ..self
        }
    }

    /// Transport for URL queries and mutations. Default is a [`ReqwestClient`].
    pub fn http_client(self, http_client: impl HttpClient + 'static) -> Self {
        Self {
            http_client: Some(Rc::new(http_client)),
            ..self
        }
    }

    /// Creates the client.
    pub fn build(self) -> QueryClient {
        let cache = QueryCache::new(self.max_queries);
        let http = self
            .http_client
            .unwrap_or_else(|| Rc::new(ReqwestClient::new()));
        QueryClient {
            fetcher: FetchManager::new(cache.clone(), http),
            cache,
            default_options: self.default_options,
        }
    }
}

impl QueryClient {
    /// Creates a client with default options and transport.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a client.
    pub fn builder() -> QueryClientBuilder {
        QueryClientBuilder {
            default_options: DefaultQueryOptions::default(),
            max_queries: DEFAULT_MAX_QUERIES,
            http_client: None,
        }
    }

    /// The options new queries start from.
    pub fn default_options(&self) -> DefaultQueryOptions {
        self.default_options
    }

    /// The underlying cache.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The transport shared by this client's queries and mutations.
    pub fn http_client(&self) -> Rc<dyn HttpClient> {
        self.fetcher.http()
    }

    pub(crate) fn fetcher(&self) -> &FetchManager {
        &self.fetcher
    }

    /// Observes a query. Shorthand for [`QueryObserver::new`].
    pub fn observe(&self, options: QueryOptions) -> QueryObserver {
        QueryObserver::new(self, options)
    }

    /// Creates a mutation. Shorthand for [`MutationObserver::new`].
    pub fn mutation(&self, options: MutationOptions) -> MutationObserver {
        MutationObserver::new(self, options)
    }

    /// Fetch a query and store it in cache.
    ///
    /// Fresh cached data is returned without a request. A request already in flight for the
    /// same key is awaited instead of repeated. Runs even while query loading is suppressed.
    ///
    /// If you don't need the result opt for [`prefetch_query()`](Self::prefetch_query)
    pub async fn fetch_query(&self, options: QueryOptions) -> Result<Value, QueryError> {
        let options = options.validate();
        let key = options.cache_key();

        if let Some(data) = self.cache.get(&key).and_then(|state| {
            let fresh = !is_stale(state.updated_at, options.stale_time, self.cache.now());
            state.data.filter(|_| fresh)
        }) {
            return Ok(data);
        }

        if !self.fetcher.is_fetching(&key) {
            self.fetcher.fetch_data(&options, None);
        }
        if let Some(done) = self.fetcher.wait_for(&key) {
            let _ = done.await;
        }

        match self.cache.peek(&key) {
            Some(QueryState {
                error: Some(error), ..
            }) => Err(error),
            Some(QueryState {
                data: Some(data), ..
            }) => Ok(data),
            _ => Err(QueryError::fetch(format!(
                "query {key} was removed before its fetch completed"
            ))),
        }
    }

    /// Prefetch a query and store it in cache.
    /// Cached data that is still fresh is kept. Does nothing while query loading is suppressed.
    ///
    /// If you need the result opt for [`fetch_query()`](Self::fetch_query)
    pub async fn prefetch_query(&self, options: QueryOptions) {
        if is_query_load_suppressed() {
            return;
        }
        if let Err(err) = self.fetch_query(options).await {
            tracing::debug!(%err, "prefetch failed");
        }
    }

    /// The cached data of a query, if any.
    pub fn get_query_data(&self, key: impl Into<QueryKey>) -> Option<Value> {
        self.get_query_state(key).and_then(|state| state.data)
    }

    /// Retrieve the current state for an existing query.
    /// If the query does not exist, [`None`](Option::None) will be returned.
    /// Useful for when you want to introspect the state of a query without affecting its recency.
    pub fn get_query_state(&self, key: impl Into<QueryKey>) -> Option<QueryState> {
        self.cache.peek(&key.into().serialize())
    }

    /// Update the query's data.
    /// If the query does not exist, it will be created.
    pub fn set_query_data(&self, key: impl Into<QueryKey>, data: impl Into<Value>) {
        let data = data.into();
        self.update_query_data(key, move |_| Some(data));
    }

    /// A synchronous function that can be used to immediately set a query's data.
    ///
    /// If the query does not exist, it will be created.
    ///
    /// If the updater function returns [`None`](Option::None), the query data will not be updated.
    ///
    /// If the updater function receives [`None`](Option::None) as input, you can return [`None`](Option::None) to bail out of the update and thus not create a new cache entry.
    ///
    /// Returns whether the data was written.
    ///
    /// Example:
    /// ```
    /// use rquery::*;
    ///
    /// fn rename() {
    ///     let client = QueryClient::new();
    ///     // Overwrite existing data.
    ///     client.set_query_data(query_key!["monkey", 0], "George");
    ///
    ///     // Don't overwrite George.
    ///     client.update_query_data(query_key!["monkey", 0], |probably_george| {
    ///         if probably_george.and_then(Value::as_str) == Some("George") {
    ///             return None;
    ///         }
    ///         Some(Value::from("Luffy"))
    ///     });
    /// }
    /// ```
    pub fn update_query_data(
        &self,
        key: impl Into<QueryKey>,
        updater: impl FnOnce(Option<&Value>) -> Option<Value>,
    ) -> bool {
        let key = key.into().serialize();
        let previous = self.cache.peek(&key);
        let Some(data) = updater(previous.as_ref().and_then(QueryState::data)) else {
            return false;
        };

        let data = replace_equal_deep_opt(previous.as_ref().and_then(QueryState::data), Some(data));
        self.cache.set(
            &key,
            QueryState {
                data,
                error: None,
                is_loading: false,
                is_fetching: self.fetcher.is_fetching(&key),
                updated_at: self.cache.now(),
            },
        );
        self.cache
            .schedule_gc_if_unobserved(&key, self.default_options.gc_time);
        true
    }

    /// Invalidates every query whose key starts with `prefix`.
    /// Matching queries are marked as invalid, and observed ones are refetched in the background.
    ///
    /// Returns the number of invalidated queries.
    ///
    /// Example:
    /// ```
    /// use rquery::*;
    ///
    /// fn invalidate() {
    ///     let client = QueryClient::new();
    ///     // ["todos"], ["todos", 1], ["todos", 1, "comments"], ...
    ///     let invalidated = client.invalidate_queries(query_key!["todos"]);
    /// }
    /// ```
    pub fn invalidate_queries(&self, prefix: impl Into<QueryKey>) -> usize {
        let prefix = prefix.into();
        self.invalidate_where(|key| key.starts_with(&prefix))
    }

    /// Invalidates all queries in the cache.
    pub fn invalidate_all_queries(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    fn invalidate_where(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
        let mut invalidated = 0;
        for (key, state) in self.cache.get_all() {
            if matches(&QueryKey::from_serialized(&key)) {
                self.cache.set(&key, state.invalidated());
                invalidated += 1;
            }
        }
        tracing::debug!(invalidated, "invalidated queries");
        invalidated
    }

    /// Removes every query whose key starts with `prefix`. Returns how many were removed.
    pub fn remove_queries(&self, prefix: impl Into<QueryKey>) -> usize {
        let prefix = prefix.into();
        self.cache
            .get_all()
            .into_keys()
            .filter(|key| QueryKey::from_serialized(key).starts_with(&prefix))
            .filter(|key| self.cache.delete(key))
            .count()
    }

    /// Clears the cache. All queries will be removed.
    pub fn clear(&self) {
        self.cache.clear()
    }

    /// Size and metadata counters of the cache.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Registers the cache observer.
    pub fn register_cache_observer(&self, observer: impl CacheObserver + 'static) {
        self.cache.register_observer(observer);
    }

    /// Settled queries, in a form that can be sent to another client.
    pub fn dehydrate(&self) -> DehydratedState {
        let queries = self
            .cache
            .get_all()
            .into_iter()
            .filter(|(_, state)| state.has_settled())
            .map(|(key, state)| DehydratedQuery {
                key,
                state: QueryState {
                    is_loading: false,
                    is_fetching: false,
                    ..state
                },
            })
            .collect();
        DehydratedState { queries }
    }

    /// Merges dehydrated queries into the cache.
    ///
    /// An incoming query only replaces a cached one that is older. Hydrated queries nobody
    /// observes are garbage collected after the default gc time. Returns the number of
    /// queries written.
    pub fn hydrate(&self, state: DehydratedState) -> usize {
        let mut hydrated = 0;
        for DehydratedQuery { key, state } in state.queries {
            let newer = self
                .cache
                .peek(&key)
                .map_or(true, |existing| existing.updated_at < state.updated_at);
            if !newer {
                continue;
            }
            self.cache.set(
                &key,
                QueryState {
                    is_loading: false,
                    is_fetching: self.fetcher.is_fetching(&key),
                    ..state
                },
            );
            self.cache
                .schedule_gc_if_unobserved(&key, self.default_options.gc_time);
            hydrated += 1;
        }
        tracing::debug!(hydrated, "hydrated queries");
        hydrated
    }
}

/// Queries exported by [`QueryClient::dehydrate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DehydratedState {
    /// The exported queries.
    pub queries: Vec<DehydratedQuery>,
}

/// One exported query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DehydratedQuery {
    /// Serialized query key.
    pub key: String,
    /// Cached state, with in-flight flags cleared.
    pub state: QueryState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{query_key, runtime::test_util::*, Instant};
    use serde_json::json;
    use std::{cell::Cell, time::Duration};

    fn counting(key: impl Into<QueryKey>, calls: Rc<Cell<usize>>) -> QueryOptions {
        QueryOptions::query_fn(key, move |_, _| {
            let calls = calls.clone();
            async move {
                calls.set(calls.get() + 1);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Value::from(calls.get() as i64))
            }
        })
    }

    async fn settle(ms: u64) {
        flush().await;
        tokio::time::advance(Duration::from_millis(ms)).await;
        flush().await;
    }

    #[tokio::test]
    async fn update_query_data() {
        run_local(async {
            let client = QueryClient::new();
            let state = || client.get_query_data("0");

            assert_eq!(None, state());
            assert_eq!(0, client.stats().size);

            assert!(!client.update_query_data("0", |_| None));

            assert_eq!(None, state());
            assert_eq!(0, client.stats().size);

            assert!(client.update_query_data("0", |_| Some(Value::from("0"))));

            assert_eq!(1, client.stats().size);
            assert_eq!(Some(Value::from("0")), state());

            let settled = client.get_query_state("0").unwrap();
            assert!(!settled.is_loading && !settled.is_fetching);

            client.update_query_data("0", |_| Some(Value::from("1")));
            assert_eq!(Some(Value::from("1")), state());
        })
        .await
    }

    #[tokio::test]
    async fn set_query_data_new_query() {
        run_local(async {
            let client = QueryClient::new();
            assert_eq!(None, client.get_query_data("todos"));

            client.set_query_data("todos", "New Data");

            assert_eq!(Some(Value::from("New Data")), client.get_query_data("todos"));
        })
        .await
    }

    #[tokio::test]
    async fn set_query_data_existing_query() {
        run_local(async {
            let client = QueryClient::new();
            client.set_query_data(query_key!["todo", 1], "Initial Data");
            assert_eq!(
                Some(Value::from("Initial Data")),
                client.get_query_data(query_key!["todo", 1])
            );

            client.set_query_data(query_key!["todo", 1], "Updated Data");
            assert_eq!(
                Some(Value::from("Updated Data")),
                client.get_query_data(query_key!["todo", 1])
            );
        })
        .await
    }

    #[tokio::test]
    async fn set_query_data_shares_unchanged_subtrees() {
        run_local(async {
            let client = QueryClient::new();
            client.set_query_data("user", json!({"name": "A", "tags": ["x", "y"]}));
            let before = client.get_query_data("user").unwrap();

            client.set_query_data("user", json!({"name": "B", "tags": ["x", "y"]}));
            let after = client.get_query_data("user").unwrap();

            assert!(before.get("tags").unwrap().ptr_eq(after.get("tags").unwrap()));
            assert_eq!(after.get("name"), Some(&Value::from("B")));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn unobserved_data_is_garbage_collected() {
        run_local(async {
            let client = QueryClient::builder()
                .default_options(DefaultQueryOptions {
                    gc_time: Some(Duration::from_secs(1)),
                    ..DefaultQueryOptions::default()
                })
                .build();
            client.set_query_data("todos", 1);
            settle(999).await;
            assert!(client.cache().has("todos"));
            settle(2).await;
            assert!(!client.cache().has("todos"));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn can_invalidate_while_subscribed() {
        run_local(async {
            let client = QueryClient::new();
            let calls = Rc::new(Cell::new(0));
            let observer = client.observe(counting("0", calls.clone()));
            settle(100).await;
            assert_eq!(calls.get(), 1);

            assert_eq!(client.invalidate_queries("0"), 1);
            let state = client.get_query_state("0").unwrap();
            assert!(state.is_invalidated(), "Query should be invalid");

            settle(100).await;
            assert_eq!(calls.get(), 2, "Observed query should refetch");
            assert!(!client.get_query_state("0").unwrap().is_invalidated());
            observer.destroy();
        })
        .await
    }

    #[tokio::test]
    async fn can_invalidate_subset() {
        run_local(async {
            let client = QueryClient::new();
            client.set_query_data(query_key!["todos", 1], 1);
            client.set_query_data(query_key!["todos", 2], 2);
            client.set_query_data(query_key!["users", 1], 3);

            assert_eq!(client.invalidate_queries(query_key!["todos"]), 2);

            let invalid = |key: QueryKey| client.get_query_state(key).unwrap().is_invalidated();
            assert!(invalid(query_key!["todos", 1]));
            assert!(invalid(query_key!["todos", 2]));
            assert!(!invalid(query_key!["users", 1]));
            assert_eq!(
                client.get_query_data(query_key!["todos", 1]),
                Some(Value::from(1)),
                "Invalidation keeps data"
            );
        })
        .await
    }

    #[tokio::test]
    async fn invalidate_all() {
        run_local(async {
            let client = QueryClient::new();
            client.set_query_data("0", "1234");
            client.set_query_data("1", "5678");
            client.set_query_data(query_key![0], 1234);
            client.set_query_data(query_key![1], 5678);

            assert_eq!(client.invalidate_all_queries(), 4);
            assert!(client
                .cache()
                .get_all()
                .values()
                .all(QueryState::is_invalidated));
        })
        .await
    }

    #[tokio::test]
    async fn remove_by_prefix() {
        run_local(async {
            let client = QueryClient::new();
            client.set_query_data(query_key!["todos", 1], 1);
            client.set_query_data(query_key!["todos", 2], 2);
            client.set_query_data("todos-legacy", 3);

            assert_eq!(client.remove_queries(query_key!["todos"]), 2);
            assert_eq!(client.stats().size, 1);
            assert!(client.cache().has("todos-legacy"));
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_query_returns_fresh_data_without_fetching() {
        run_local(async {
            let client = QueryClient::new();
            let calls = Rc::new(Cell::new(0));
            client.set_query_data("a", 42);

            let data = client.fetch_query(counting("a", calls.clone())).await;
            assert_eq!(data, Ok(Value::from(42)));
            assert_eq!(calls.get(), 0);
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_query_joins_the_request_in_flight() {
        run_local(async {
            let client = QueryClient::new();
            let calls = Rc::new(Cell::new(0));
            let observer = client.observe(counting("a", calls.clone()));

            let data = client.fetch_query(counting("a", calls.clone())).await;
            assert_eq!(data, Ok(Value::from(1)));
            assert_eq!(calls.get(), 1);
            observer.destroy();
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_query_reports_errors() {
        run_local(async {
            let client = QueryClient::new();
            let options =
                QueryOptions::query_fn("a", |_, _| async { Err(QueryError::fetch("offline")) });
            assert_eq!(
                client.fetch_query(options).await,
                Err(QueryError::fetch("offline"))
            );
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_respects_load_suppression() {
        run_local(async {
            let client = QueryClient::new();
            let calls = Rc::new(Cell::new(0));

            crate::suppress_query_load(true);
            client.prefetch_query(counting("a", calls.clone())).await;
            crate::suppress_query_load(false);
            assert_eq!(calls.get(), 0);
            assert!(!client.cache().has("a"));

            client.prefetch_query(counting("a", calls.clone())).await;
            assert_eq!(calls.get(), 1);
            assert_eq!(client.get_query_data("a"), Some(Value::from(1)));
        })
        .await
    }

    #[tokio::test]
    async fn dehydrate_then_hydrate() {
        run_local(async {
            let server = QueryClient::new();
            server.set_query_data(query_key!["todo", 1], json!({"title": "write tests"}));
            server.cache().set("pending", QueryState::loading());

            let dehydrated = server.dehydrate();
            assert_eq!(dehydrated.queries.len(), 1);
            let wire = serde_json::to_string(&dehydrated).unwrap();

            let browser = QueryClient::new();
            let incoming: DehydratedState = serde_json::from_str(&wire).unwrap();
            assert_eq!(browser.hydrate(incoming), 1);
            assert_eq!(
                browser.get_query_data(query_key!["todo", 1]),
                Some(Value::from(json!({"title": "write tests"})))
            );
        })
        .await
    }

    #[tokio::test]
    async fn hydrate_keeps_newer_entries() {
        run_local(async {
            let client = QueryClient::new();
            client.cache().set(
                "a",
                QueryState::with_data(Value::from("local"), Instant::from_millis(200)),
            );
            client.cache().set(
                "b",
                QueryState::with_data(Value::from("local"), Instant::from_millis(100)),
            );

            let incoming = DehydratedState {
                queries: vec![
                    DehydratedQuery {
                        key: "a".into(),
                        state: QueryState::with_data(Value::from("remote"), Instant::from_millis(150)),
                    },
                    DehydratedQuery {
                        key: "b".into(),
                        state: QueryState::with_data(Value::from("remote"), Instant::from_millis(150)),
                    },
                ],
            };
            assert_eq!(client.hydrate(incoming), 1);
            assert_eq!(client.get_query_data("a"), Some(Value::from("local")));
            assert_eq!(client.get_query_data("b"), Some(Value::from("remote")));
        })
        .await
    }

    #[cfg(not(feature = "ssr"))]
    #[tokio::test]
    async fn default_client_is_shared_until_reset() {
        run_local(async {
            reset_query_client();
            assert_eq!(configured_default_options(), None);

            let client = use_query_client();
            client.cache().set("a", QueryState::with_data(Value::from(1), Instant::from_millis(1)));
            assert!(use_query_client().cache().has("a"));
            assert_eq!(configured_default_options(), Some(DefaultQueryOptions::default()));

            configure_query_client(|| QueryClient::builder().max_queries(5).build());
            let configured = use_query_client();
            assert!(!configured.cache().has("a"));
            assert_eq!(configured.stats().max_size, 5);

            reset_query_client();
            assert_eq!(configured_default_options(), None);
        })
        .await
    }

    #[test]
    fn cache_writes_work_without_runtime() {
        let client = QueryClient::builder()
            .http_client(crate::http_client::mock::MockHttp::default())
            .build();
        client.set_query_data("a", 1);
        assert_eq!(client.invalidate_queries("a"), 1);
        assert_eq!(client.get_query_data("a"), Some(Value::from(1)));
        assert_eq!(client.remove_queries("a"), 1);
        assert!(client.cache().get("a").is_none());
    }
}
