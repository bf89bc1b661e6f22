use std::{
    cell::RefCell,
    collections::HashSet,
    rc::Rc,
};

use crate::{Instant, QueryError, Value};

/// Refetch the query, ignoring staleness.
#[derive(Clone)]
pub struct Refetch(pub(crate) Rc<dyn Fn()>);

impl Refetch {
    /// Starts a fetch.
    pub fn call(&self) {
        (self.0)()
    }

    pub(crate) fn noop() -> Self {
        Refetch(Rc::new(|| {}))
    }
}

impl std::fmt::Debug for Refetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Refetch")
    }
}

/// What an observer reports for its query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// The (selected) data, or placeholder data.
    pub data: Option<Value>,
    /// The error of the last failed fetch.
    pub error: Option<QueryError>,
    /// No data yet and the first fetch is in flight.
    pub is_loading: bool,
    /// A fetch is in flight.
    pub is_fetching: bool,
    /// Not loading, no error, data present.
    pub is_success: bool,
    /// The last fetch failed.
    pub is_error: bool,
    /// The data is older than the stale time, or was invalidated.
    pub is_stale: bool,
    /// `data` is placeholder data, not cached data.
    pub is_placeholder_data: bool,
    /// When the cached data was fetched.
    pub updated_at: Instant,
    /// Refetch the query.
    pub refetch: Refetch,
}

impl QueryResult {
    pub(crate) fn loading(refetch: Refetch) -> Self {
        QueryResult {
            data: None,
            error: None,
            is_loading: true,
            is_fetching: true,
            is_success: false,
            is_error: false,
            is_stale: true,
            is_placeholder_data: false,
            updated_at: Instant::ZERO,
            refetch,
        }
    }

    pub(crate) fn idle(refetch: Refetch) -> Self {
        QueryResult {
            is_loading: false,
            is_fetching: false,
            ..Self::loading(refetch)
        }
    }

    /// Whether `field` differs between `self` and `other`. Data is compared by value.
    pub(crate) fn field_changed(&self, other: &QueryResult, field: ResultField) -> bool {
        match field {
            ResultField::Data => self.data != other.data,
            ResultField::Error => self.error != other.error,
            ResultField::IsLoading => self.is_loading != other.is_loading,
            ResultField::IsFetching => self.is_fetching != other.is_fetching,
            ResultField::IsSuccess => self.is_success != other.is_success,
            ResultField::IsError => self.is_error != other.is_error,
            ResultField::IsStale => self.is_stale != other.is_stale,
            ResultField::IsPlaceholderData => self.is_placeholder_data != other.is_placeholder_data,
            ResultField::UpdatedAt => self.updated_at != other.updated_at,
        }
    }
}

/// A field of [`QueryResult`] that a consumer can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultField {
    /// [`QueryResult::data`]
    Data,
    /// [`QueryResult::error`]
    Error,
    /// [`QueryResult::is_loading`]
    IsLoading,
    /// [`QueryResult::is_fetching`]
    IsFetching,
    /// [`QueryResult::is_success`]
    IsSuccess,
    /// [`QueryResult::is_error`]
    IsError,
    /// [`QueryResult::is_stale`]
    IsStale,
    /// [`QueryResult::is_placeholder_data`]
    IsPlaceholderData,
    /// [`QueryResult::updated_at`]
    UpdatedAt,
}

impl ResultField {
    /// Every field.
    pub const ALL: [ResultField; 9] = [
        ResultField::Data,
        ResultField::Error,
        ResultField::IsLoading,
        ResultField::IsFetching,
        ResultField::IsSuccess,
        ResultField::IsError,
        ResultField::IsStale,
        ResultField::IsPlaceholderData,
        ResultField::UpdatedAt,
    ];
}

/// Read-tracking view of an observer's current result.
///
/// Each getter records its field. Once anything was read, the observer only notifies its
/// listeners when one of the recorded fields changes. The record is shared by every clone
/// handed out by the same observer.
#[derive(Clone)]
pub struct TrackedResult {
    result: Rc<QueryResult>,
    tracked: Rc<RefCell<HashSet<ResultField>>>,
}

impl TrackedResult {
    pub(crate) fn new(result: Rc<QueryResult>, tracked: Rc<RefCell<HashSet<ResultField>>>) -> Self {
        Self { result, tracked }
    }

    fn track(&self, field: ResultField) {
        self.tracked.borrow_mut().insert(field);
    }

    /// The (selected) data, or placeholder data.
    pub fn data(&self) -> Option<&Value> {
        self.track(ResultField::Data);
        self.result.data.as_ref()
    }

    /// The error of the last failed fetch.
    pub fn error(&self) -> Option<&QueryError> {
        self.track(ResultField::Error);
        self.result.error.as_ref()
    }

    /// No data yet and the first fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.track(ResultField::IsLoading);
        self.result.is_loading
    }

    /// A fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.track(ResultField::IsFetching);
        self.result.is_fetching
    }

    /// Not loading, no error, data present.
    pub fn is_success(&self) -> bool {
        self.track(ResultField::IsSuccess);
        self.result.is_success
    }

    /// The last fetch failed.
    pub fn is_error(&self) -> bool {
        self.track(ResultField::IsError);
        self.result.is_error
    }

    /// The data is stale.
    pub fn is_stale(&self) -> bool {
        self.track(ResultField::IsStale);
        self.result.is_stale
    }

    /// `data` is placeholder data.
    pub fn is_placeholder_data(&self) -> bool {
        self.track(ResultField::IsPlaceholderData);
        self.result.is_placeholder_data
    }

    /// When the cached data was fetched.
    pub fn updated_at(&self) -> Instant {
        self.track(ResultField::UpdatedAt);
        self.result.updated_at
    }

    /// Refetch the query. Not tracked.
    pub fn refetch(&self) {
        self.result.refetch.call()
    }

    /// Declares dependencies up front instead of reading them.
    pub fn track_fields(&self, fields: impl IntoIterator<Item = ResultField>) {
        self.tracked.borrow_mut().extend(fields);
    }

    /// The full result. Reading through this does not track anything.
    pub fn untracked(&self) -> &QueryResult {
        &self.result
    }

    /// Fields read so far.
    pub fn tracked_fields(&self) -> HashSet<ResultField> {
        self.tracked.borrow().clone()
    }
}

impl std::fmt::Debug for TrackedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedResult")
            .field("result", &self.result)
            .field("tracked", &self.tracked.borrow())
            .finish()
    }
}

/// Whether listeners should hear about `next`.
///
/// The first result always notifies, and so does every result while nothing has been read.
/// Once fields are tracked, only changes to those fields notify.
pub(crate) fn should_notify(
    previous: Option<&QueryResult>,
    next: &QueryResult,
    tracked: &HashSet<ResultField>,
) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    tracked.is_empty()
        || tracked
            .iter()
            .any(|field| previous.field_changed(next, *field))
}
