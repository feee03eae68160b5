// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Serialized Data Envelope
//!
//! `SerializedData` pairs a serializer identifier with the bytes that
//! serializer produced. Adapters that cannot carry structured data move it
//! around as a flat JSON document with exactly two string fields,
//! `serializerIdentifier` and `data`.

use crate::errors::QueueError;
use serde::{Deserialize, Serialize};

/// Immutable envelope for a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedData {
    serializer_identifier: String,
    data: Vec<u8>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Interchange<'a> {
    serializer_identifier: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedInterchange {
    serializer_identifier: String,
    data: String,
}

impl SerializedData {
    /// Wraps already serialized bytes.
    ///
    /// # Parameters
    /// * `serializer_identifier` - Identifier of the serializer that produced `data`
    /// * `data` - The serialized payload
    pub fn new(serializer_identifier: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        SerializedData {
            serializer_identifier: serializer_identifier.into(),
            data: data.into(),
        }
    }

    pub fn serializer_identifier(&self) -> &str {
        &self.serializer_identifier
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encodes the envelope to its JSON interchange form.
    ///
    /// The interchange `data` field is a string, so the payload bytes must be
    /// valid UTF-8.
    pub fn to_json(&self) -> Result<String, QueueError> {
        let data = std::str::from_utf8(&self.data).map_err(|err| {
            QueueError::serialization(format!(
                "failure to JSON encode serialized data: {err}"
            ))
            .push_context(self.serializer_identifier.clone())
        })?;

        serde_json::to_string(&Interchange {
            serializer_identifier: &self.serializer_identifier,
            data,
        })
        .map_err(|err| QueueError::serialization(err.to_string()))
    }

    /// Decodes an envelope from its JSON interchange form.
    pub fn from_json(json: &str) -> Result<SerializedData, QueueError> {
        let decoded: OwnedInterchange = serde_json::from_str(json).map_err(|err| {
            QueueError::deserialization(format!("invalid serialized data envelope: {err}"))
        })?;

        Ok(SerializedData::new(
            decoded.serializer_identifier,
            decoded.data.into_bytes(),
        ))
    }
}
