//! Structured-output schema descriptors
//!
//! A caller asks for schema-constrained output by handing the request a
//! [`SchemaDescriptor`]. Translators only need the JSON Schema to send and,
//! optionally, a validator for what comes back.

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Outcome of validating a structured reply
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// The descriptor has no validator; the raw input is used as-is
    Unchecked,
    /// The input was accepted, possibly normalized
    Valid(Value),
    /// The input was rejected
    Invalid(String),
}

pub trait SchemaDescriptor: Send + Sync + fmt::Debug {
    /// JSON Schema sent to the provider
    fn to_json_schema(&self) -> Value;

    /// Validate the mapping the model produced
    fn validate(&self, input: &Value) -> Validation;
}

/// A bare JSON Schema with no validator attached
#[derive(Debug, Clone, PartialEq)]
pub struct RawSchema(pub Value);

impl SchemaDescriptor for RawSchema {
    fn to_json_schema(&self) -> Value {
        self.0.clone()
    }

    fn validate(&self, _input: &Value) -> Validation {
        Validation::Unchecked
    }
}

/// A schema backed by a Rust type; replies are validated by deserializing into `T`
pub struct TypedSchema<T> {
    schema: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            _marker: PhantomData,
        }
    }
}

impl<T: JsonSchema + DeserializeOwned + Serialize> TypedSchema<T> {
    /// Schema generated from `T` itself, so the sent schema and the validator agree
    pub fn derived() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({}));
        Self::new(schema)
    }
}

impl<T> fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .field("schema", &self.schema)
            .finish()
    }
}

impl<T> SchemaDescriptor for TypedSchema<T>
where
    T: DeserializeOwned + Serialize,
{
    fn to_json_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate(&self, input: &Value) -> Validation {
        let parsed = match serde_json::from_value::<T>(input.clone()) {
            Ok(parsed) => parsed,
            Err(e) => return Validation::Invalid(e.to_string()),
        };
        match serde_json::to_value(&parsed) {
            Ok(value) => Validation::Valid(value),
            Err(e) => Validation::Invalid(e.to_string()),
        }
    }
}
