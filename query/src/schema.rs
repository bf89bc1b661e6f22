use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::{ValidationError, Value};

/// Validates (and may normalize) a fetched payload before it is cached.
pub trait Schema {
    /// Parses the raw payload.
    fn parse(&self, value: Value) -> Result<Value, ValidationError>;
}

impl<F> Schema for F
where
    F: Fn(Value) -> Result<Value, ValidationError>,
{
    fn parse(&self, value: Value) -> Result<Value, ValidationError> {
        self(value)
    }
}

/// A schema backed by a serde type.
///
/// The payload is deserialized into `T` and serialized back, so unknown fields are dropped
/// and defaults declared on `T` are filled in.
///
/// ```
/// use rquery::{Schema, SerdeSchema, Value};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct User {
///     id: u32,
/// }
///
/// let schema = SerdeSchema::<User>::new();
/// assert!(schema.parse(Value::from(serde_json::json!({"id": 1}))).is_ok());
/// assert!(schema.parse(Value::from(serde_json::json!({"id": "one"}))).is_err());
/// ```
pub struct SerdeSchema<T>(PhantomData<fn() -> T>);

impl<T> SerdeSchema<T> {
    /// Creates the schema.
    pub fn new() -> Self {
        SerdeSchema(PhantomData)
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for SerdeSchema<T>
where
    T: DeserializeOwned + Serialize,
{
    fn parse(&self, value: Value) -> Result<Value, ValidationError> {
        let typed: T = value
            .deserialize_into()
            .map_err(|e| ValidationError::new(e.to_string()))?;
        Value::from_serialize(&typed).map_err(|e| ValidationError::new(e.to_string()))
    }
}
