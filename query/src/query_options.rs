use std::{future::Future, rc::Rc, time::Duration};

use futures::{future::LocalBoxFuture, FutureExt};

use crate::{
    placeholder::PlaceholderData, ConfigError, HttpClient, QueryError, QueryKey, QueryState,
    RequestConfig, Schema, SelectError, Value,
};

/// Default options for all queries under this client.
/// Only differs from [`QueryOptions`] in that it doesn't carry a key or a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultQueryOptions {
    /// Time before a query is considered stale.
    pub stale_time: Option<Duration>,
    /// Time before an inactive query is removed from cache.
    pub gc_time: Option<Duration>,
    /// Time before a query is refetched.
    pub refetch_interval: Option<Duration>,
}

impl Default for DefaultQueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Some(DEFAULT_STALE_TIME),
            gc_time: Some(DEFAULT_GC_TIME),
            refetch_interval: None,
        }
    }
}

const DEFAULT_STALE_TIME: Duration = Duration::from_secs(10);
const DEFAULT_GC_TIME: Duration = Duration::from_secs(60 * 5);

/// A custom fetcher. Receives the query params (if any) and the client's HTTP client.
pub type QueryFn =
    Rc<dyn Fn(Option<Value>, Rc<dyn HttpClient>) -> LocalBoxFuture<'static, Result<Value, QueryError>>>;

/// Transform applied to cached data before it is handed to observers.
pub type SelectFn = Rc<dyn Fn(&Value) -> Result<Value, SelectError>>;

/// Where the data of a query comes from. Exactly one source exists per query.
#[derive(Clone)]
pub enum QuerySource {
    /// A GET request through the client's [`HttpClient`].
    Url {
        /// Request URL.
        url: String,
        /// Extra headers and query params. Query params are merged with the query's `params`.
        fetch_config: RequestConfig,
    },
    /// A custom async function.
    Custom(QueryFn),
}

impl QuerySource {
    /// The URL of a URL-mode query.
    pub fn url(&self) -> Option<&str> {
        match self {
            QuerySource::Url { url, .. } => Some(url),
            QuerySource::Custom(_) => None,
        }
    }
}

impl std::fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuerySource::Url { url, fetch_config } => f
                .debug_struct("Url")
                .field("url", url)
                .field("fetch_config", fetch_config)
                .finish(),
            QuerySource::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Whether a query may fetch.
#[derive(Clone)]
pub enum Enabled {
    /// Fixed.
    Bool(bool),
    /// Evaluated against the query params.
    When(Rc<dyn Fn(Option<&Value>) -> bool>),
}

impl Enabled {
    /// Evaluates the flag for `params`.
    pub fn evaluate(&self, params: Option<&Value>) -> bool {
        match self {
            Enabled::Bool(enabled) => *enabled,
            Enabled::When(predicate) => predicate(params),
        }
    }
}

impl Default for Enabled {
    fn default() -> Self {
        Enabled::Bool(true)
    }
}

impl From<bool> for Enabled {
    fn from(enabled: bool) -> Self {
        Enabled::Bool(enabled)
    }
}

impl std::fmt::Debug for Enabled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Enabled::Bool(enabled) => write!(f, "Bool({enabled})"),
            Enabled::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Options for a query [`QueryObserver`](crate::QueryObserver).
#[derive(Clone)]
pub struct QueryOptions {
    /// Identifies the cached entry.
    pub key: QueryKey,
    /// How the data is fetched.
    pub source: QuerySource,
    /// Parameters passed to the fetcher. For URL queries these become query string params.
    pub params: Option<Value>,
    /// Whether the query may fetch. A disabled query only reports what is already cached.
    pub enabled: Enabled,
    /// The duration that should pass before a query is considered stale.
    /// If the query is stale, it will be refetched.
    /// If no stale_time, the query will never be considered stale.
    /// Stale_time can never be greater than gc_time.
    /// Default is 10 seconds.
    pub stale_time: Option<Duration>,
    /// The amount of time an unobserved query stays cached.
    /// If no gc time, the query will never be removed from cache by the garbage collector.
    /// Default is 5 minutes.
    pub gc_time: Option<Duration>,
    /// If no refetch interval, the query will never refetch on a timer.
    pub refetch_interval: Option<Duration>,
    /// Validates fetched data before it is cached.
    pub schema: Option<Rc<dyn Schema>>,
    /// Transforms cached data for this observer only.
    pub select: Option<SelectFn>,
    /// Shown while the entry has no data yet. Never written to the cache.
    pub placeholder_data: Option<PlaceholderData>,
}

impl QueryOptions {
    /// A query that GETs `url`.
    pub fn url(key: impl Into<QueryKey>, url: impl Into<String>) -> Self {
        Self::with_source(
            key.into(),
            QuerySource::Url {
                url: url.into(),
                fetch_config: RequestConfig::default(),
            },
        )
    }

    /// A query backed by a custom async function.
    pub fn query_fn<F, Fut>(key: impl Into<QueryKey>, query_fn: F) -> Self
    where
        F: Fn(Option<Value>, Rc<dyn HttpClient>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + 'static,
    {
        let query_fn: QueryFn = Rc::new(move |params, http| query_fn(params, http).boxed_local());
        Self::with_source(key.into(), QuerySource::Custom(query_fn))
    }

    /// Starts a builder that checks the source configuration.
    pub fn builder(key: impl Into<QueryKey>) -> QueryOptionsBuilder {
        QueryOptionsBuilder {
            key: key.into(),
            url: None,
            fetch_config: RequestConfig::default(),
            query_fn: None,
        }
    }

    fn with_source(key: QueryKey, source: QuerySource) -> Self {
        // Use client wide defaults if they exist.
        let defaults = crate::query_client::configured_default_options().unwrap_or_default();
        QueryOptions {
            key,
            source,
            params: None,
            enabled: Enabled::default(),
            stale_time: defaults.stale_time,
            gc_time: defaults.gc_time,
            refetch_interval: defaults.refetch_interval,
            schema: None,
            select: None,
            placeholder_data: None,
        }
        .validate()
    }

    /// The serialized cache key.
    pub fn cache_key(&self) -> String {
        self.key.serialize()
    }

    /// Evaluates `enabled` against the current params.
    pub fn is_enabled(&self) -> bool {
        self.enabled.evaluate(self.params.as_ref())
    }

    /// Set the key.
    pub fn set_key(self, key: impl Into<QueryKey>) -> Self {
        QueryOptions {
            key: key.into(),
            ..self
        }
    }

    /// Set the params.
    pub fn set_params(self, params: Option<Value>) -> Self {
        QueryOptions { params, ..self }
    }

    /// Set the enabled flag or predicate.
    pub fn set_enabled(self, enabled: impl Into<Enabled>) -> Self {
        QueryOptions {
            enabled: enabled.into(),
            ..self
        }
    }

    /// Enable the query only while `predicate` holds for the params.
    pub fn set_enabled_when(self, predicate: impl Fn(Option<&Value>) -> bool + 'static) -> Self {
        QueryOptions {
            enabled: Enabled::When(Rc::new(predicate)),
            ..self
        }
    }

    /// Set the stale_time.
    pub fn set_stale_time(self, stale_time: Option<Duration>) -> Self {
        QueryOptions { stale_time, ..self }
    }

    /// Set the gc time.
    pub fn set_gc_time(self, gc_time: Option<Duration>) -> Self {
        QueryOptions { gc_time, ..self }
    }

    /// Set the refetch interval.
    pub fn set_refetch_interval(self, refetch_interval: Option<Duration>) -> Self {
        QueryOptions {
            refetch_interval,
            ..self
        }
    }

    /// Set the response schema.
    pub fn set_schema(self, schema: impl Schema + 'static) -> Self {
        QueryOptions {
            schema: Some(Rc::new(schema)),
            ..self
        }
    }

    /// Set the select transform.
    pub fn set_select(
        self,
        select: impl Fn(&Value) -> Result<Value, SelectError> + 'static,
    ) -> Self {
        QueryOptions {
            select: Some(Rc::new(select)),
            ..self
        }
    }

    /// Show a fixed value until the query has data.
    pub fn set_placeholder_data(self, data: impl Into<Value>) -> Self {
        QueryOptions {
            placeholder_data: Some(PlaceholderData::Static(data.into())),
            ..self
        }
    }

    /// Derive placeholder data from the most recently updated sibling query.
    ///
    /// Siblings are entries whose key starts with the same segment as this query's key.
    pub fn set_placeholder_fn(
        self,
        placeholder: impl Fn(&Value, &QueryState) -> Option<Value> + 'static,
    ) -> Self {
        QueryOptions {
            placeholder_data: Some(PlaceholderData::Fn(Rc::new(placeholder))),
            ..self
        }
    }

    /// Set the per-request configuration of a URL query. No-op for custom queries.
    pub fn set_fetch_config(self, config: RequestConfig) -> Self {
        let source = match self.source {
            QuerySource::Url { url, .. } => QuerySource::Url {
                url,
                fetch_config: config,
            },
            custom => custom,
        };
        QueryOptions { source, ..self }
    }

    /// Ensures that gc_time is >= than stale_time.
    pub fn validate(self) -> Self {
        let stale_time = ensure_valid_stale_time(&self.stale_time, &self.gc_time);
        QueryOptions { stale_time, ..self }
    }
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("params", &self.params)
            .field("enabled", &self.enabled)
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("refetch_interval", &self.refetch_interval)
            .field("schema", &self.schema.is_some())
            .field("select", &self.select.is_some())
            .field("placeholder_data", &self.placeholder_data)
            .finish()
    }
}

/// Builds [`QueryOptions`] from loosely specified sources, rejecting configurations that have
/// both a URL and a query function, or neither.
pub struct QueryOptionsBuilder {
    key: QueryKey,
    url: Option<String>,
    fetch_config: RequestConfig,
    query_fn: Option<QueryFn>,
}

impl QueryOptionsBuilder {
    /// Fetch with a GET request to `url`.
    pub fn url(self, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..self
        }
    }

    /// Per-request configuration for the URL.
    pub fn fetch_config(self, fetch_config: RequestConfig) -> Self {
        Self {
            fetch_config,
            ..self
        }
    }

    /// Fetch with a custom function.
    pub fn query_fn<F, Fut>(self, query_fn: F) -> Self
    where
        F: Fn(Option<Value>, Rc<dyn HttpClient>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + 'static,
    {
        let query_fn: QueryFn = Rc::new(move |params, http| query_fn(params, http).boxed_local());
        Self {
            query_fn: Some(query_fn),
            ..self
        }
    }

    /// Checks the source and produces the options.
    pub fn build(self) -> Result<QueryOptions, ConfigError> {
        let source = match (self.url, self.query_fn) {
            (Some(url), None) => QuerySource::Url {
                url,
                fetch_config: self.fetch_config,
            },
            (None, Some(query_fn)) => QuerySource::Custom(query_fn),
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSource),
            (None, None) => return Err(ConfigError::MissingSource),
        };
        Ok(QueryOptions::with_source(self.key, source))
    }
}

fn ensure_valid_stale_time(
    stale_time: &Option<Duration>,
    gc_time: &Option<Duration>,
) -> Option<Duration> {
    match (stale_time, gc_time) {
        (Some(ref stale_time), Some(ref gc_time)) => {
            if stale_time > gc_time {
                tracing::warn!(
                    stale_time = stale_time.as_millis() as u64,
                    gc_time = gc_time.as_millis() as u64,
                    "stale_time is greater than gc_time. Using gc time instead."
                );
                Some(*gc_time)
            } else {
                Some(*stale_time)
            }
        }
        (None, Some(ref gc_duration)) => {
            tracing::warn!(
                gc_time = gc_duration.as_millis() as u64,
                "stale_time (infinity) is greater than gc_time. Using gc_time instead."
            );
            *gc_time
        }
        (stale_time, _) => *stale_time,
    }
}
