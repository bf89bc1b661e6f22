use crate::Value;

/// Identifies one logical query.
///
/// Keys are either a plain string or an ordered sequence of segments such as
/// `["user", 1, "profile"]`. Two keys are equivalent when their [serialized](QueryKey::serialize)
/// forms are equal.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKey {
    /// A plain string key, stored as is.
    Str(String),
    /// A structured key.
    Segments(Vec<Value>),
}

/// Builds a segmented [`QueryKey`].
///
/// ```
/// use rquery::{query_key, QueryKey};
///
/// let key = query_key!["user", 1];
/// assert_eq!(key.serialize(), r#"["user",1]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),* $(,)?) => {
        $crate::QueryKey::Segments(vec![$($crate::Value::from($segment)),*])
    };
}

impl QueryKey {
    /// Canonical string form used for storage and equality.
    ///
    /// String keys are returned unchanged. Segmented keys serialize to compact JSON; object
    /// segments are written with sorted property names.
    pub fn serialize(&self) -> String {
        match self {
            QueryKey::Str(s) => s.clone(),
            QueryKey::Segments(segments) => {
                serde_json::Value::Array(segments.iter().map(serde_json::Value::from).collect())
                    .to_string()
            }
        }
    }

    /// Recovers a key from its serialized form.
    ///
    /// Anything that parses as a JSON array is treated as a segmented key; every other string
    /// is a plain string key.
    pub fn from_serialized(serialized: &str) -> QueryKey {
        if serialized.starts_with('[') {
            if let Ok(segments) = serde_json::from_str::<Vec<Value>>(serialized) {
                return QueryKey::Segments(segments);
            }
        }
        QueryKey::Str(serialized.to_string())
    }

    /// First segment of a segmented key.
    pub fn first_segment(&self) -> Option<&Value> {
        match self {
            QueryKey::Segments(segments) => segments.first(),
            QueryKey::Str(_) => None,
        }
    }

    /// Prefix matching used by invalidation and removal.
    ///
    /// - A segmented prefix matches segmented keys whose leading segments are equal to it.
    /// - A string prefix matches any key whose serialized form starts with that string.
    ///
    /// A segmented prefix never matches a plain string key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        match (self, prefix) {
            (QueryKey::Segments(segments), QueryKey::Segments(prefix)) => {
                prefix.len() <= segments.len()
                    && segments.iter().zip(prefix.iter()).all(|(a, b)| a == b)
            }
            (key, QueryKey::Str(prefix)) => key.serialize().starts_with(prefix.as_str()),
            (QueryKey::Str(_), QueryKey::Segments(_)) => false,
        }
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        QueryKey::Str(key.to_string())
    }
}

impl From<String> for QueryKey {
    fn from(key: String) -> Self {
        QueryKey::Str(key)
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(segments: Vec<Value>) -> Self {
        QueryKey::Segments(segments)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}
