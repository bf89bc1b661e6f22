#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # About Query
//!
//! rquery is an asynchronous server-state cache for single-threaded Rust applications, such as
//! UIs compiled to WebAssembly or a `current_thread` tokio runtime.
//!
//! Heavily inspired by [Tanstack Query](https://tanstack.com/query/latest/).
//!
//! Queries are useful for data fetching, caching, and synchronization with server state.
//!
//! A Query provides:
//! - caching, bounded by a least-recently-used limit
//! - de-duplication
//! - invalidation
//! - background refetching
//! - refetch intervals
//! - memory management with cache lifetimes
//! - structural sharing of unchanged data
//! - placeholder data
//! - response schema validation
//! - optimistic updates through mutations
//! - dehydration and hydration, for handing a server rendered cache to the browser
//!
//! ## The main entry points are:
//! - [`QueryClient`] - Owns the cache and the HTTP transport, and manages queries directly.
//! - [`QueryObserver`] - A query primitive for reading, caching, and refetching data.
//! - [`MutationObserver`] - Sends changes to the server and invalidates affected queries.
//!
//! # Feature Flags
//! - `csr` Client-side rendering: Use queries in the browser.
//! - `ssr` Server-side rendering: Every [`use_query_client`] call returns a fresh client.
//! - `hydrate` Hydration: Use queries in the browser after a server render.
//!
//! # Runtime
//!
//! Nothing in this crate is `Send`. Natively, queries must be driven from inside a
//! [`tokio::task::LocalSet`]; with `csr` or `hydrate` the browser's event loop is used.
//!
//! # A Simple Example
//!
//! ```rust,no_run
//! use rquery::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     tokio::task::LocalSet::new()
//!         .run_until(async {
//!             let client = QueryClient::builder()
//!                 .http_client(ReqwestClient::new().base_url("https://api.example.com"))
//!                 .build();
//!
//!             // GET https://api.example.com/tracks?page=1
//!             let tracks = client.observe(
//!                 QueryOptions::url(query_key!["tracks", 1], "/tracks")
//!                     .set_params(Some(Value::object([("page", Value::from(1))]))),
//!             );
//!
//!             // Only reads of `data` are tracked, so only data changes notify.
//!             tracks.subscribe(|result| {
//!                 if let Some(tracks) = result.data() {
//!                     println!("tracks: {tracks}");
//!                 }
//!             });
//!
//!             // Renaming a track refetches every query under ["tracks"].
//!             let rename = client.mutation(
//!                 MutationOptions::url(Method::PATCH, "/tracks/7")
//!                     .set_invalidates([query_key!["tracks"]]),
//!             );
//!             let _ = rename.mutate(Value::object([("name", Value::from("Intro"))])).await;
//!         })
//!         .await;
//! }
//! ```
//!

/// Subscriptions to cache-wide query events.
pub mod cache_observer;
mod error;
mod garbage_collector;
mod http_client;
mod instant;
mod mutation;
mod options_manager;
mod placeholder;
mod query_cache;
mod query_client;
mod query_executor;
mod query_key;
mod query_observer;
mod query_options;
mod query_result;
mod query_state;
mod result_computer;
mod runtime;
mod schema;
mod structural_sharing;
mod util;
mod value;

pub use error::{ConfigError, QueryError, SelectError, ValidationError};
pub use http_client::{HttpClient, HttpResponse, Method, ReqwestClient, RequestConfig};
pub use instant::Instant;
pub use mutation::{
    MutationFn, MutationListenerKey, MutationObserver, MutationOptions, MutationOptionsBuilder,
    MutationSource, MutationState, MutationStatus,
};
pub use placeholder::{PlaceholderData, PlaceholderFn};
pub use query_cache::{
    CacheSnapshot, CacheStats, ListenerKey, ListenerSubscription, QueryCache, SubscriberKey,
    DEFAULT_MAX_QUERIES,
};
pub use query_client::{
    configure_query_client, reset_query_client, use_query_client, DehydratedQuery,
    DehydratedState, QueryClient, QueryClientBuilder,
};
pub use query_executor::suppress_query_load;
pub use query_key::QueryKey;
pub use query_observer::{ObserverListenerKey, QueryObserver};
pub use query_options::{
    DefaultQueryOptions, Enabled, QueryFn, QueryOptions, QueryOptionsBuilder, QuerySource,
    SelectFn,
};
pub use query_result::{QueryResult, Refetch, ResultField, TrackedResult};
pub use query_state::QueryState;
pub use schema::{Schema, SerdeSchema};
pub use structural_sharing::replace_equal_deep;
pub use value::{Map, Value};
