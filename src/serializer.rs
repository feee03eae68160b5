// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Serializers
//!
//! A `Serializer` turns a structured payload into bytes and back, and is
//! known by the identifier stored next to those bytes in `SerializedData`.
//! `DataSerializer` chains serializers: encoding picks the first one willing
//! to take the payload, decoding picks the one named by the envelope.

use crate::{data::SerializedData, errors::QueueError};
use serde_json::Value;
use std::sync::Arc;

pub const JSON_SERIALIZER: &str = "json";
pub const STRING_SERIALIZER: &str = "string";

pub trait Serializer: Send + Sync {
    /// Identifier stored in the envelope, must be non-empty.
    fn identifier(&self) -> &str;

    fn will_serialize(&self, payload: &Value) -> bool;

    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, QueueError>;

    fn unserialize(&self, data: &[u8]) -> Result<Value, QueueError>;
}

/// Encodes any payload as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn identifier(&self) -> &str {
        JSON_SERIALIZER
    }

    fn will_serialize(&self, _payload: &Value) -> bool {
        true
    }

    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(payload).map_err(|err| QueueError::serialization(err.to_string()))
    }

    fn unserialize(&self, data: &[u8]) -> Result<Value, QueueError> {
        serde_json::from_slice(data).map_err(|err| QueueError::deserialization(err.to_string()))
    }
}

/// Stores string payloads as their raw UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn identifier(&self) -> &str {
        STRING_SERIALIZER
    }

    fn will_serialize(&self, payload: &Value) -> bool {
        payload.is_string()
    }

    fn serialize(&self, payload: &Value) -> Result<Vec<u8>, QueueError> {
        match payload {
            Value::String(s) => Ok(s.clone().into_bytes()),
            _ => Err(QueueError::serialization("payload is not a string")),
        }
    }

    fn unserialize(&self, data: &[u8]) -> Result<Value, QueueError> {
        String::from_utf8(data.to_vec())
            .map(Value::String)
            .map_err(|err| QueueError::deserialization(err.to_string()))
    }
}

/// Ordered chain of serializers.
#[derive(Clone)]
pub struct DataSerializer {
    serializers: Vec<Arc<dyn Serializer>>,
}

impl Default for DataSerializer {
    fn default() -> Self {
        DataSerializer {
            serializers: vec![Arc::new(JsonSerializer)],
        }
    }
}

impl DataSerializer {
    /// Creates a chain without any serializer, not even JSON.
    pub fn empty() -> Self {
        DataSerializer {
            serializers: vec![],
        }
    }

    /// Appends a serializer to the end of the chain.
    ///
    /// A serializer with an empty identifier is a configuration error.
    pub fn register(mut self, serializer: Arc<dyn Serializer>) -> Result<Self, QueueError> {
        validate(serializer.as_ref())?;
        self.serializers.push(serializer);
        Ok(self)
    }

    /// Puts a serializer at the front of the chain, ahead of the catch-all
    /// JSON serializer of the default chain.
    pub fn prepend(mut self, serializer: Arc<dyn Serializer>) -> Result<Self, QueueError> {
        validate(serializer.as_ref())?;
        self.serializers.insert(0, serializer);
        Ok(self)
    }

    /// Encodes `payload` with the first serializer willing to take it.
    ///
    /// # Returns
    /// The envelope tagged with that serializer's identifier, or a
    /// serialization error when no serializer accepts the payload.
    pub fn serialize(&self, payload: &Value) -> Result<SerializedData, QueueError> {
        let Some(serializer) = self.serializers.iter().find(|s| s.will_serialize(payload)) else {
            return Err(QueueError::serialization("no serializer will serialize the payload"));
        };

        let data = serializer.serialize(payload)?;
        Ok(SerializedData::new(serializer.identifier(), data))
    }

    /// Decodes an envelope with the serializer it names.
    pub fn unserialize(&self, data: &SerializedData) -> Result<Value, QueueError> {
        let Some(serializer) = self
            .serializers
            .iter()
            .find(|s| s.identifier() == data.serializer_identifier())
        else {
            return Err(QueueError::deserialization(format!(
                "unknown serializer `{}`",
                data.serializer_identifier()
            ))
            .push_context(data.serializer_identifier()));
        };

        serializer
            .unserialize(data.data())
            .map_err(|err| err.push_context(data.serializer_identifier()))
    }
}

fn validate(serializer: &dyn Serializer) -> Result<(), QueueError> {
    if serializer.identifier().is_empty() {
        return Err(QueueError::configuration(
            "serializer identifier must not be empty",
        ));
    }
    Ok(())
}
