use futures::{future::LocalBoxFuture, FutureExt};
use futures_channel::oneshot;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    future::Future,
    rc::Rc,
};

use crate::{
    runtime::spawn_local, structural_sharing::replace_equal_deep_opt, util::is_stale, HttpClient,
    QueryCache, QueryError, QueryOptions, QuerySource, QueryState, Value,
};

thread_local! {
    static SUPPRESS_QUERY_LOAD: Cell<bool> = const { Cell::new(false) };
}

/// Disable or enable query loading.
///
/// Useful for disabling query loads during app introspection, such as walking the routes of a
/// server-rendered application. Observers and prefetches started while loading is suppressed
/// report cached data only.
///
/// ```
/// // Disable query loading.
/// rquery::suppress_query_load(true);
/// // Introspect app routes...
/// // Enable query loading.
/// rquery::suppress_query_load(false);
/// ```
pub fn suppress_query_load(suppress: bool) {
    SUPPRESS_QUERY_LOAD.with(|w| w.set(suppress));
}

pub(crate) fn is_query_load_suppressed() -> bool {
    SUPPRESS_QUERY_LOAD.with(|w| w.get())
}

/// Callback run after a fetch has written its result.
pub(crate) type OnComplete = Rc<dyn Fn()>;

#[derive(Default)]
struct InFlight {
    requests: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Decides when to fetch and writes fetch results into the cache.
#[derive(Clone)]
pub(crate) struct FetchManager {
    cache: QueryCache,
    http: Rc<dyn HttpClient>,
    in_flight: Rc<RefCell<HashMap<String, InFlight>>>,
}

impl FetchManager {
    pub(crate) fn new(cache: QueryCache, http: Rc<dyn HttpClient>) -> Self {
        Self {
            cache,
            http,
            in_flight: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub(crate) fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub(crate) fn http(&self) -> Rc<dyn HttpClient> {
        self.http.clone()
    }

    /// Fetches if the query is enabled and its entry is missing or stale.
    ///
    /// Requests for a key that already has a request in flight are joined, not repeated.
    /// Returns whether a fetch was started.
    pub(crate) fn execute_fetch(&self, options: &QueryOptions, on_complete: Option<OnComplete>) -> bool {
        if !options.is_enabled() || is_query_load_suppressed() {
            return false;
        }
        let key = options.cache_key();
        if self.is_fetching(&key) {
            return false;
        }
        let needs_fetch = match self.cache.get(&key) {
            None => true,
            Some(state) => is_stale(state.updated_at, options.stale_time, self.cache.now()),
        };
        if needs_fetch {
            self.fetch_data(options, on_complete);
        }
        needs_fetch
    }

    /// Fetches unconditionally.
    pub(crate) fn fetch_data(&self, options: &QueryOptions, on_complete: Option<OnComplete>) {
        spawn_local(self.start_fetch(options, on_complete));
    }

    /// Whether a request for `key` is in flight.
    pub(crate) fn is_fetching(&self, key: &str) -> bool {
        self.in_flight.borrow().contains_key(key)
    }

    /// Resolves once the requests in flight for `key` have completed.
    /// Returns `None` if nothing is in flight.
    pub(crate) fn wait_for(&self, key: &str) -> Option<oneshot::Receiver<()>> {
        let mut in_flight = self.in_flight.borrow_mut();
        let entry = in_flight.get_mut(key)?;
        let (sender, receiver) = oneshot::channel();
        entry.waiters.push(sender);
        Some(receiver)
    }

    /// Marks the entry as fetching right away and returns the request. The entry keeps its
    /// data and error so stale data can be shown while revalidating.
    fn start_fetch(
        &self,
        options: &QueryOptions,
        on_complete: Option<OnComplete>,
    ) -> impl Future<Output = ()> + 'static {
        let key = options.cache_key();
        self.in_flight
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .requests += 1;

        let marked = match self.cache.get(&key) {
            Some(state) => state.fetching(),
            None => QueryState::loading(),
        };
        self.cache.set(&key, marked);
        tracing::debug!(key, "fetching query");

        let request = self.request(options);
        let schema = options.schema.clone();
        let gc_time = options.gc_time;
        let this = self.clone();

        async move {
            let result = request.await.and_then(|raw| match schema {
                Some(schema) => schema.parse(raw).map_err(QueryError::from),
                None => Ok(raw),
            });
            this.complete(&key, result);
            this.cache.schedule_gc_if_unobserved(&key, gc_time);
            if let Some(on_complete) = on_complete {
                on_complete();
            }
        }
    }

    fn request(&self, options: &QueryOptions) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        match &options.source {
            QuerySource::Custom(query_fn) => query_fn(options.params.clone(), self.http.clone()),
            QuerySource::Url { url, fetch_config } => {
                let http = self.http.clone();
                let url = url.clone();
                let config = fetch_config.merge(options.params.as_ref());
                async move { http.get(&url, config).await.map(|response| response.data) }
                    .boxed_local()
            }
        }
    }

    fn complete(&self, key: &str, result: Result<Value, QueryError>) {
        let (still_fetching, waiters) = {
            let mut in_flight = self.in_flight.borrow_mut();
            match in_flight.get_mut(key) {
                Some(entry) if entry.requests > 1 => {
                    entry.requests -= 1;
                    (true, Vec::new())
                }
                Some(_) => {
                    let waiters = in_flight
                        .remove(key)
                        .map(|entry| entry.waiters)
                        .unwrap_or_default();
                    (false, waiters)
                }
                None => (false, Vec::new()),
            }
        };

        let previous = self.cache.peek(key);
        let updated_at = self.cache.now();
        let state = match result {
            Ok(data) => {
                tracing::debug!(key, "query fetched");
                let data = replace_equal_deep_opt(
                    previous.as_ref().and_then(QueryState::data),
                    Some(data),
                );
                QueryState {
                    data,
                    error: None,
                    is_loading: false,
                    is_fetching: still_fetching,
                    updated_at,
                }
            }
            Err(error) => {
                tracing::debug!(key, %error, "query fetch failed");
                QueryState {
                    data: previous.and_then(|state| state.data),
                    error: Some(error),
                    is_loading: false,
                    is_fetching: still_fetching,
                    updated_at,
                }
            }
        };
        self.cache.set(key, state);

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
