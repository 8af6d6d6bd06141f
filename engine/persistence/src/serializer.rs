//! Serialization capability injected into the engine
//!
//! The engine never looks inside a stored value; it only needs text in and
//! text out. Implementations must be safe to call from several threads.

use crate::error::{PersistenceError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encodes values to text and decodes them back
pub trait Serializer<T>: Send + Sync {
    /// Encode `value` as text
    fn serialize(&self, value: &T) -> Result<String>;

    /// Decode text produced by [`Serializer::serialize`]
    fn deserialize(&self, text: &str) -> Result<T>;
}

/// JSON serializer backed by `serde_json`
pub struct JsonSerializer<T> {
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    /// Compact JSON
    pub fn new() -> Self {
        Self { pretty: false, _marker: PhantomData }
    }

    /// Indented JSON, easier to inspect by hand
    pub fn pretty() -> Self {
        Self { pretty: true, _marker: PhantomData }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        text.map_err(|e| PersistenceError::serialization(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| PersistenceError::deserialization(e.to_string()))
    }
}
