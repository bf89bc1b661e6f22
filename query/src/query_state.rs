use serde::{Deserialize, Serialize};

use crate::{Instant, QueryError, Value};

/// The cached state of one query.
///
/// `updated_at` records the last successful fetch. [`Instant::ZERO`] means the entry was
/// invalidated (or has never loaded) and is always stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    /// The last successfully fetched data.
    pub data: Option<Value>,
    /// The error of the last failed fetch, cleared on the next success.
    pub error: Option<QueryError>,
    /// True while the first fetch is in flight and there is no data yet.
    pub is_loading: bool,
    /// True while any fetch is in flight.
    pub is_fetching: bool,
    /// When the data was last fetched.
    pub updated_at: Instant,
}

impl QueryState {
    /// A state holding freshly fetched data.
    pub fn with_data(data: Value, updated_at: Instant) -> Self {
        QueryState {
            data: Some(data),
            error: None,
            is_loading: false,
            is_fetching: false,
            updated_at,
        }
    }

    /// The placeholder written when a fetch starts for a key with no entry.
    pub(crate) fn loading() -> Self {
        QueryState {
            data: None,
            error: None,
            is_loading: true,
            is_fetching: true,
            updated_at: Instant::ZERO,
        }
    }

    /// Returns the data, if present.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// True once the query has settled with either data or an error.
    pub fn has_settled(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }

    /// True when the entry was invalidated and awaits a refetch.
    pub fn is_invalidated(&self) -> bool {
        self.updated_at.is_zero()
    }

    /// The same state with `updated_at` reset, forcing the next check to treat it as stale.
    pub(crate) fn invalidated(&self) -> Self {
        QueryState {
            updated_at: Instant::ZERO,
            ..self.clone()
        }
    }

    /// The same state with a fetch marked in flight. Data and error are preserved.
    pub(crate) fn fetching(&self) -> Self {
        QueryState {
            is_fetching: true,
            ..self.clone()
        }
    }
}
