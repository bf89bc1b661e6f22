//! The transport boundary used by URL-based queries and mutations.

use std::rc::Rc;

use async_trait::async_trait;
pub use reqwest::Method;

use crate::{QueryError, Value};

/// Per-request configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Query string parameters, given as an object.
    pub params: Option<Value>,
}

impl RequestConfig {
    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Merges `other` on top of `self`. Headers are appended; params are merged per field,
    /// with `other` winning.
    pub(crate) fn merge(&self, other: Option<&Value>) -> RequestConfig {
        let params = match (&self.params, other) {
            (Some(Value::Object(base)), Some(Value::Object(extra))) => {
                let mut merged = (**base).clone();
                merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(Value::Object(merged.into()))
            }
            (_, Some(extra)) => Some(extra.clone()),
            (base, None) => base.clone(),
        };
        RequestConfig {
            headers: self.headers.clone(),
            params,
        }
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// The decoded body. `Null` for empty bodies.
    pub data: Value,
}

/// An HTTP client shared by every query of a [`QueryClient`](crate::QueryClient).
///
/// Retries, interceptors and timeouts belong to implementations of this trait; the cache only
/// records whether a request succeeded.
#[async_trait(?Send)]
pub trait HttpClient {
    /// Performs a request.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        config: RequestConfig,
    ) -> Result<HttpResponse, QueryError>;

    /// Performs a GET request.
    async fn get(&self, url: &str, config: RequestConfig) -> Result<HttpResponse, QueryError> {
        self.request(Method::GET, url, None, config).await
    }
}

#[async_trait(?Send)]
impl<T: HttpClient + ?Sized> HttpClient for Rc<T> {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        config: RequestConfig,
    ) -> Result<HttpResponse, QueryError> {
        (**self).request(method, url, body, config).await
    }
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
}

impl ReqwestClient {
    /// Creates a client without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    /// Relative URLs are resolved against `base_url`.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
            _ => url.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl HttpClient for ReqwestClient {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        config: RequestConfig,
    ) -> Result<HttpResponse, QueryError> {
        let url = self.resolve(url);
        tracing::debug!(%method, %url, "sending request");

        let mut request = self.client.request(method, &url);
        for (name, value) in self.headers.iter().chain(config.headers.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(params) = &config.params {
            request = request.query(&query_pairs(params));
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?.error_for_status()?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice::<Value>(&bytes)?
        };
        Ok(HttpResponse { status, data })
    }
}

/// Flattens an object into query string pairs. Arrays repeat their key and nested objects
/// are sent as JSON.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }

    let Some(map) = params.as_object() else {
        return Vec::new();
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map.iter() {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), scalar(item))));
            }
            other => pairs.push((key.clone(), scalar(other))),
        }
    }
    pairs
}
