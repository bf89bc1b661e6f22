use std::rc::Rc;

use crate::{QueryCache, QueryKey, QueryOptions, QueryState, Value};

/// Derives placeholder data from a sibling entry's data and state.
pub type PlaceholderFn = Rc<dyn Fn(&Value, &QueryState) -> Option<Value>>;

/// Data shown while a query has nothing cached yet.
#[derive(Clone)]
pub enum PlaceholderData {
    /// A fixed value.
    Static(Value),
    /// Computed from the most recently updated sibling query.
    Fn(PlaceholderFn),
}

impl std::fmt::Debug for PlaceholderData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceholderData::Static(value) => f.debug_tuple("Static").field(value).finish(),
            PlaceholderData::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// Per-observer placeholder state. Never written to the cache.
#[derive(Debug, Default)]
pub(crate) struct PlaceholderManager {
    data: Option<Value>,
    is_active: bool,
}

impl PlaceholderManager {
    /// Returns the placeholder for `options`, computing it on first use.
    pub(crate) fn compute(&mut self, cache: &QueryCache, options: &QueryOptions) -> Option<Value> {
        if self.is_active {
            return self.data.clone();
        }

        let cache_key = options.cache_key();
        if cache.peek(&cache_key).is_some_and(|state| state.data.is_some()) {
            return None;
        }

        let data = match options.placeholder_data.as_ref()? {
            PlaceholderData::Static(value) => Some(value.clone()),
            PlaceholderData::Fn(derive) => {
                let (sibling_key, sibling) = find_sibling(cache, &options.key, &cache_key)?;
                tracing::trace!(key = %cache_key, sibling = %sibling_key, "deriving placeholder");
                let sibling_data = sibling.data.as_ref()?;
                derive(sibling_data, &sibling)
            }
        };

        if data.is_some() {
            self.data = data.clone();
            self.is_active = true;
        }
        data
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_active
    }

    /// Drops the placeholder once real data (or an error) arrives.
    pub(crate) fn deactivate(&mut self) {
        self.is_active = false;
        self.data = None;
    }
}

/// The most recently updated entry, other than `cache_key` itself, whose key shares the first
/// segment of `key` and which holds non-null data.
fn find_sibling(cache: &QueryCache, key: &QueryKey, cache_key: &str) -> Option<(String, QueryState)> {
    let first = key.first_segment()?;
    cache
        .get_all()
        .into_iter()
        .filter(|(other, _)| other != cache_key)
        .filter(|(_, state)| state.data.as_ref().is_some_and(|data| !data.is_null()))
        .filter(|(other, _)| QueryKey::from_serialized(other).first_segment() == Some(first))
        .max_by_key(|(_, state)| state.updated_at)
}
