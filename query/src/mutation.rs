//! Mutations: requests that change server state, with optimistic updates and invalidation.

use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::{Rc, Weak},
};

use futures::{future::LocalBoxFuture, FutureExt};
use slotmap::{new_key_type, SlotMap};

use crate::{
    runtime::{queue_microtask, spawn_local},
    ConfigError, HttpClient, Instant, Method, QueryClient, QueryError, QueryKey, RequestConfig,
    Schema, Value,
};

/// A custom mutation. Receives the variables and the client's HTTP client.
pub type MutationFn =
    Rc<dyn Fn(Value, Rc<dyn HttpClient>) -> LocalBoxFuture<'static, Result<Value, QueryError>>>;

type OnMutate = Rc<dyn Fn(&QueryClient, &Value) -> Option<Value>>;
type OnSuccess = Rc<dyn Fn(&QueryClient, &Value, &Value, Option<&Value>)>;
type OnError = Rc<dyn Fn(&QueryClient, &QueryError, &Value, Option<&Value>)>;
type OnSettled = Rc<dyn Fn(&QueryClient, Result<&Value, &QueryError>, &Value, Option<&Value>)>;

/// Where a mutation sends its variables.
#[derive(Clone)]
pub enum MutationSource {
    /// An HTTP request with the variables as JSON body.
    Http {
        /// Request method.
        method: Method,
        /// Request URL.
        url: String,
        /// Extra headers and query params.
        config: RequestConfig,
    },
    /// A custom async function.
    Custom(MutationFn),
}

impl std::fmt::Debug for MutationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationSource::Http {
                method,
                url,
                config,
            } => f
                .debug_struct("Http")
                .field("method", method)
                .field("url", url)
                .field("config", config)
                .finish(),
            MutationSource::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for a [`MutationObserver`].
///
/// Hooks run in this order: `on_mutate` before the request, then `on_success` or `on_error`,
/// then `on_settled`. Whatever `on_mutate` returns is handed to the later hooks as context,
/// typically the data needed to roll back an optimistic update.
#[derive(Clone)]
pub struct MutationOptions {
    /// Where the variables are sent.
    pub source: MutationSource,
    /// Validates the response.
    pub schema: Option<Rc<dyn Schema>>,
    /// Queries invalidated after a successful mutation, by key prefix.
    pub invalidates: Vec<QueryKey>,
    on_mutate: Option<OnMutate>,
    on_success: Option<OnSuccess>,
    on_error: Option<OnError>,
    on_settled: Option<OnSettled>,
}

impl MutationOptions {
    /// Sends the variables to `url` with `method`.
    pub fn url(method: Method, url: impl Into<String>) -> Self {
        Self::with_source(MutationSource::Http {
            method,
            url: url.into(),
            config: RequestConfig::default(),
        })
    }

    /// Runs a custom async function.
    pub fn mutation_fn<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(Value, Rc<dyn HttpClient>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + 'static,
    {
        let mutation_fn: MutationFn =
            Rc::new(move |variables, http| mutation_fn(variables, http).boxed_local());
        Self::with_source(MutationSource::Custom(mutation_fn))
    }

    /// Starts a builder that checks the source configuration.
    pub fn builder() -> MutationOptionsBuilder {
        MutationOptionsBuilder::default()
    }

    fn with_source(source: MutationSource) -> Self {
        MutationOptions {
            source,
            schema: None,
            invalidates: Vec::new(),
            on_mutate: None,
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }

    /// Runs before the request. The returned value is passed to the other hooks.
    pub fn set_on_mutate(
        self,
        on_mutate: impl Fn(&QueryClient, &Value) -> Option<Value> + 'static,
    ) -> Self {
        MutationOptions {
            on_mutate: Some(Rc::new(on_mutate)),
            ..self
        }
    }

    /// Runs with the response data.
    pub fn set_on_success(
        self,
        on_success: impl Fn(&QueryClient, &Value, &Value, Option<&Value>) + 'static,
    ) -> Self {
        MutationOptions {
            on_success: Some(Rc::new(on_success)),
            ..self
        }
    }

    /// Runs with the error.
    pub fn set_on_error(
        self,
        on_error: impl Fn(&QueryClient, &QueryError, &Value, Option<&Value>) + 'static,
    ) -> Self {
        MutationOptions {
            on_error: Some(Rc::new(on_error)),
            ..self
        }
    }

    /// Runs last, either way.
    pub fn set_on_settled(
        self,
        on_settled: impl Fn(&QueryClient, Result<&Value, &QueryError>, &Value, Option<&Value>)
            + 'static,
    ) -> Self {
        MutationOptions {
            on_settled: Some(Rc::new(on_settled)),
            ..self
        }
    }

    /// Key prefixes to invalidate once the mutation succeeds.
    pub fn set_invalidates(self, keys: impl IntoIterator<Item = impl Into<QueryKey>>) -> Self {
        MutationOptions {
            invalidates: keys.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Set the response schema.
    pub fn set_schema(self, schema: impl Schema + 'static) -> Self {
        MutationOptions {
            schema: Some(Rc::new(schema)),
            ..self
        }
    }

    fn request(
        &self,
        variables: Value,
        http: Rc<dyn HttpClient>,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        match &self.source {
            MutationSource::Custom(mutation_fn) => mutation_fn(variables, http),
            MutationSource::Http {
                method,
                url,
                config,
            } => {
                let method = method.clone();
                let url = url.clone();
                let config = config.clone();
                async move {
                    http.request(method, &url, Some(variables), config)
                        .await
                        .map(|response| response.data)
                }
                .boxed_local()
            }
        }
    }
}

impl std::fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationOptions")
            .field("source", &self.source)
            .field("invalidates", &self.invalidates)
            .field("schema", &self.schema.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds [`MutationOptions`], rejecting a method without a URL, a URL together with a
/// function, or neither.
#[derive(Default)]
pub struct MutationOptionsBuilder {
    url: Option<String>,
    method: Option<Method>,
    config: RequestConfig,
    mutation_fn: Option<MutationFn>,
}

impl MutationOptionsBuilder {
    /// Send the variables to `url`.
    pub fn url(self, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..self
        }
    }

    /// HTTP method. Default is POST.
    pub fn method(self, method: Method) -> Self {
        Self {
            method: Some(method),
            ..self
        }
    }

    /// Headers and query params for the URL.
    pub fn config(self, config: RequestConfig) -> Self {
        Self { config, ..self }
    }

    /// Run a custom function.
    pub fn mutation_fn<F, Fut>(self, mutation_fn: F) -> Self
    where
        F: Fn(Value, Rc<dyn HttpClient>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + 'static,
    {
        let mutation_fn: MutationFn =
            Rc::new(move |variables, http| mutation_fn(variables, http).boxed_local());
        Self {
            mutation_fn: Some(mutation_fn),
            ..self
        }
    }

    /// Checks the source and produces the options.
    pub fn build(self) -> Result<MutationOptions, ConfigError> {
        let source = match (self.url, self.method, self.mutation_fn) {
            (Some(_), _, Some(_)) => return Err(ConfigError::ConflictingSource),
            (None, Some(_), _) => return Err(ConfigError::MethodWithoutUrl),
            (Some(url), method, None) => MutationSource::Http {
                method: method.unwrap_or(Method::POST),
                url,
                config: self.config,
            },
            (None, None, Some(mutation_fn)) => MutationSource::Custom(mutation_fn),
            (None, None, None) => return Err(ConfigError::MissingSource),
        };
        Ok(MutationOptions::with_source(source))
    }
}

/// Lifecycle of a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationStatus {
    /// Not started, or reset.
    #[default]
    Idle,
    /// The request is in flight.
    Pending,
    /// The last request succeeded.
    Success,
    /// The last request failed.
    Error,
}

/// What a [`MutationObserver`] reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationState {
    /// Response of the last successful mutation.
    pub data: Option<Value>,
    /// Error of the last failed mutation.
    pub error: Option<QueryError>,
    /// Variables of the latest mutation.
    pub variables: Option<Value>,
    /// Lifecycle status.
    pub status: MutationStatus,
    /// When the latest mutation started.
    pub submitted_at: Option<Instant>,
}

impl MutationState {
    /// No mutation has run since creation or the last reset.
    pub fn is_idle(&self) -> bool {
        self.status == MutationStatus::Idle
    }

    /// A mutation is in flight.
    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }

    /// The latest mutation succeeded.
    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }

    /// The latest mutation failed.
    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
}

new_key_type! {
    /// Identifies a listener registered with [`MutationObserver::subscribe`].
    pub struct MutationListenerKey;
}

type Listener = Rc<dyn Fn(&MutationState)>;

/// Runs mutations and tracks the state of the latest one.
///
/// Only the most recent call to [`mutate`](Self::mutate) is reflected in the state; an older
/// call that settles later still runs its hooks but does not overwrite the state.
#[derive(Clone)]
pub struct MutationObserver {
    inner: Rc<MutationInner>,
}

struct MutationInner {
    this: Weak<MutationInner>,
    client: QueryClient,
    options: RefCell<MutationOptions>,
    state: RefCell<MutationState>,
    listeners: RefCell<SlotMap<MutationListenerKey, Listener>>,
    generation: Cell<u64>,
    notify_scheduled: Cell<bool>,
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver")
            .field("options", &self.inner.options.borrow())
            .field("state", &self.inner.state.borrow())
            .finish()
    }
}

impl MutationObserver {
    /// Creates an idle mutation bound to `client`.
    pub fn new(client: &QueryClient, options: MutationOptions) -> Self {
        let inner = Rc::new_cyclic(|this| MutationInner {
            this: this.clone(),
            client: client.clone(),
            options: RefCell::new(options),
            state: RefCell::new(MutationState::default()),
            listeners: RefCell::new(SlotMap::with_key()),
            generation: Cell::new(0),
            notify_scheduled: Cell::new(false),
        });
        MutationObserver { inner }
    }

    /// Runs the mutation and returns its result.
    ///
    /// The state turns pending and `on_mutate` runs before this returns. On success the
    /// configured key prefixes are invalidated before `on_success` runs, so observed queries
    /// start refetching right away.
    pub fn mutate(
        &self,
        variables: impl Into<Value>,
    ) -> impl Future<Output = Result<Value, QueryError>> {
        self.inner.clone().run(variables.into())
    }

    /// Runs the mutation in the background. The outcome is only visible through the state.
    pub fn trigger(&self, variables: impl Into<Value>) {
        let run = self.inner.clone().run(variables.into());
        spawn_local(async move {
            let _ = run.await;
        });
    }

    /// The state of the latest mutation.
    pub fn state(&self) -> MutationState {
        self.inner.state.borrow().clone()
    }

    /// Registers a listener for state changes.
    pub fn subscribe(&self, listener: impl Fn(&MutationState) + 'static) -> MutationListenerKey {
        self.inner.listeners.borrow_mut().insert(Rc::new(listener))
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, key: MutationListenerKey) -> bool {
        self.inner.listeners.borrow_mut().remove(key).is_some()
    }

    /// Replaces the options. Mutations already running keep the options they started with.
    pub fn set_options(&self, options: MutationOptions) {
        *self.inner.options.borrow_mut() = options;
    }

    /// Returns to the idle state. Results of mutations still running are discarded.
    pub fn reset(&self) {
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.set_state(MutationState::default());
    }
}

impl MutationInner {
    /// Starts synchronously: the state is pending and `on_mutate` has run before the returned
    /// future is first polled.
    fn run(self: Rc<Self>, variables: Value) -> impl Future<Output = Result<Value, QueryError>> {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let options = self.options.borrow().clone();

        self.set_state(MutationState {
            data: None,
            error: None,
            variables: Some(variables.clone()),
            status: MutationStatus::Pending,
            submitted_at: Some(self.client.cache().now()),
        });

        let context = options
            .on_mutate
            .as_ref()
            .and_then(|on_mutate| on_mutate(&self.client, &variables));
        let request = options.request(variables.clone(), self.client.http_client());
        tracing::debug!(source = ?options.source, "mutation started");

        async move {
            let result = request.await.and_then(|raw| match &options.schema {
                Some(schema) => schema.parse(raw).map_err(QueryError::from),
                None => Ok(raw),
            });
            let client = &self.client;
            let context = context.as_ref();

            match &result {
                Ok(data) => {
                    tracing::debug!("mutation succeeded");
                    for prefix in &options.invalidates {
                        client.invalidate_queries(prefix.clone());
                    }
                    if let Some(on_success) = &options.on_success {
                        on_success(client, data, &variables, context);
                    }
                }
                Err(error) => {
                    tracing::debug!(%error, "mutation failed");
                    if let Some(on_error) = &options.on_error {
                        on_error(client, error, &variables, context);
                    }
                }
            }
            if let Some(on_settled) = &options.on_settled {
                on_settled(client, result.as_ref(), &variables, context);
            }

            if self.generation.get() == generation {
                let submitted_at = self.state.borrow().submitted_at;
                self.set_state(MutationState {
                    data: result.as_ref().ok().cloned(),
                    error: result.as_ref().err().cloned(),
                    variables: Some(variables),
                    status: if result.is_ok() {
                        MutationStatus::Success
                    } else {
                        MutationStatus::Error
                    },
                    submitted_at,
                });
            }
            result
        }
    }

    fn set_state(&self, state: MutationState) {
        *self.state.borrow_mut() = state;
        self.schedule_notify();
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
            let state = inner.state.borrow().clone();
            let listeners: Vec<Listener> = inner.listeners.borrow().values().cloned().collect();
            for listener in listeners {
                listener(&state);
            }
        });
    }
}
