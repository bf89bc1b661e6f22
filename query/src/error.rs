//! Error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed fetch, stored in the cache as the query's `error`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryError {
    /// The server answered, but the payload did not match the response schema.
    #[error("response failed schema validation: {0}")]
    Validation(#[from] ValidationError),

    /// The transport failed or the server answered with a non-success status.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Response status, if a response was received.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response payload: {0}")]
    Decode(String),

    /// A custom query function failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl QueryError {
    /// Creates a [`QueryError::Fetch`] from any displayable error.
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        QueryError::Fetch(err.to_string())
    }

    /// True if the server sent malformed data, as opposed to being unreachable.
    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }

    /// HTTP status of the failed response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Http { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return QueryError::Decode(err.to_string());
        }
        QueryError::Http {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Decode(err.to_string())
    }
}

/// Raised by a [`Schema`](crate::Schema) when a payload does not conform.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// Human readable reason.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Invalid query or mutation configuration, reported when the options are built.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither a URL nor a custom function was provided.
    #[error("a url or a query function is required")]
    MissingSource,
    /// Both a URL and a custom function were provided.
    #[error("a url and a query function are mutually exclusive")]
    ConflictingSource,
    /// An HTTP method was provided without a URL.
    #[error("an http method can only be used together with a url")]
    MethodWithoutUrl,
}

/// Returned by a `select` transform. The untransformed data is used instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("select failed: {0}")]
pub struct SelectError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = QueryError::Http {
            status: Some(503),
            message: "service unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP request failed: service unavailable");
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_validation());

        let err: QueryError = ValidationError::new("missing field `id`").into();
        assert_eq!(
            err.to_string(),
            "response failed schema validation: missing field `id`"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::ConflictingSource.to_string(),
            "a url and a query function are mutually exclusive"
        );
    }
}
