use crate::{
    placeholder::PlaceholderManager, util::is_stale, Instant, QueryCache, QueryOptions,
    QueryResult, QueryState, Refetch, Value,
};

/// Derives the observable result for `options` from the cache.
///
/// 1. Disabled queries report whatever is cached, never loading or fetching.
/// 2. A settled entry is reported through `select`.
/// 3. Without one, placeholder data is reported if available.
/// 4. Otherwise the query is loading.
pub(crate) fn compute_result(
    cache: &QueryCache,
    options: &QueryOptions,
    placeholder: &mut PlaceholderManager,
    refetch: Refetch,
) -> QueryResult {
    let cache_key = options.cache_key();
    let entry = cache.get(&cache_key);
    let now = cache.now();

    if !options.is_enabled() {
        return match entry {
            Some(state) => QueryResult {
                is_loading: false,
                is_fetching: false,
                ..from_state(state, None, options, now, refetch)
            },
            None => QueryResult::idle(refetch),
        };
    }

    if let Some(state) = entry.filter(|state| state.has_settled() || !state.is_loading) {
        placeholder.deactivate();
        let data = state.data.as_ref().map(|data| select(options, data));
        return from_state(state, Some(data), options, now, refetch);
    }

    if let Some(data) = placeholder.compute(cache, options) {
        return QueryResult {
            data: Some(select(options, &data)),
            is_loading: false,
            is_fetching: true,
            is_success: true,
            is_placeholder_data: true,
            ..QueryResult::loading(refetch)
        };
    }

    QueryResult::loading(refetch)
}

/// `selected` replaces the raw data when given.
fn from_state(
    state: QueryState,
    selected: Option<Option<Value>>,
    options: &QueryOptions,
    now: Instant,
    refetch: Refetch,
) -> QueryResult {
    let data = selected.unwrap_or(state.data);
    QueryResult {
        is_success: !state.is_loading && state.error.is_none() && data.is_some(),
        is_error: state.error.is_some(),
        is_stale: is_stale(state.updated_at, options.stale_time, now),
        is_placeholder_data: false,
        is_loading: state.is_loading,
        is_fetching: state.is_fetching,
        updated_at: state.updated_at,
        error: state.error,
        data,
        refetch,
    }
}

fn select(options: &QueryOptions, data: &Value) -> Value {
    match &options.select {
        None => data.clone(),
        Some(select) => select(data).unwrap_or_else(|err| {
            tracing::warn!(key = %options.key, %err, "select failed, using unselected data");
            data.clone()
        }),
    }
}
