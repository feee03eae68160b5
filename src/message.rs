// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Messages
//!
//! A `Message` is a topic plus a structured payload. Messages read back from a
//! queue additionally carry the adapter's delivery identifier and whatever
//! backend-specific internals the adapter needs to acknowledge them later.

use crate::errors::QueueError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Backend-specific delivery data, opaque to everything but the adapter.
pub type Internals = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    uuid: Uuid,
    topic: String,
    payload: Value,
    identifier: Option<String>,
    internals: Internals,
}

impl Message {
    /// Creates a new, not yet enqueued message with a fresh UUID.
    pub fn create(topic: impl Into<String>, payload: Value) -> Message {
        Message {
            uuid: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            identifier: None,
            internals: Internals::default(),
        }
    }

    pub(crate) fn delivered(
        uuid: Uuid,
        topic: String,
        payload: Value,
        identifier: String,
        internals: Internals,
    ) -> Message {
        Message {
            uuid,
            topic,
            payload,
            identifier: Some(identifier),
            internals,
        }
    }

    /// Identity assigned at creation; survives the round trip through the adapter.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserializes the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        T::deserialize(&self.payload).map_err(|err| {
            QueueError::deserialization(err.to_string()).push_context(self.topic.clone())
        })
    }

    /// Delivery identifier assigned by the adapter, `None` until dequeued.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Adapter-specific delivery metadata, empty for a created message.
    pub fn internals(&self) -> &Internals {
        &self.internals
    }
}
