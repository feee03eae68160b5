// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! This module provides the error types shared by every part of the queue client.
//! `QueueError` pairs a closed set of failure kinds with an ordered list of
//! diagnostic values (the error *context*) that the raiser can attach and any
//! catching code can inspect. `AmqpError` covers the transport failures of the
//! RabbitMQ-backed adapter and folds into `QueueErrorKind::Adapter`.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The kinds of failure a queue operation can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueErrorKind {
    /// Transport or backend failure during enqueue, dequeue, ack or purge
    #[error("adapter failure: {0}")]
    Adapter(String),

    /// A payload could not be encoded
    #[error("failure to serialize: {0}")]
    Serialization(String),

    /// A payload or envelope could not be decoded
    #[error("failure to deserialize: {0}")]
    Deserialization(String),

    /// No registered handler accepts the dequeued message
    #[error("no handler will handle a message of topic `{topic}`")]
    NoHandler { topic: String },

    /// A handler failed while processing a message
    #[error("handler failure: {0}")]
    Handler(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Error raised by queue, adapter, serializer and processor operations.
///
/// The `context` is an ordered list of arbitrary values attached by whoever
/// raised the error, so an error callback can log structured diagnostics
/// without knowing their shape up front.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueError {
    kind: QueueErrorKind,
    context: Vec<Value>,
}

impl QueueError {
    /// Creates an error of the given kind with an empty context.
    pub fn new(kind: QueueErrorKind) -> Self {
        QueueError {
            kind,
            context: vec![],
        }
    }

    /// Transport failure raised by an adapter.
    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Adapter(msg.into()))
    }

    /// A payload or envelope could not be encoded.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Serialization(msg.into()))
    }

    /// A record, envelope or payload could not be decoded.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Deserialization(msg.into()))
    }

    /// No registered handler accepts messages of `topic`.
    pub fn no_handler(topic: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::NoHandler {
            topic: topic.into(),
        })
    }

    /// Raised by a `MessageHandler` that failed outright.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Handler(msg.into()))
    }

    /// Invalid adapter or serializer configuration.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Configuration(msg.into()))
    }

    /// Replaces the error context with the given values.
    pub fn with_context<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.context = values.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a single value to the error context.
    pub fn push_context(mut self, value: impl Into<Value>) -> Self {
        self.context.push(value.into());
        self
    }

    /// Returns the failure kind.
    pub fn kind(&self) -> &QueueErrorKind {
        &self.kind
    }

    /// Returns the context values in the order they were attached.
    pub fn context(&self) -> &[Value] {
        &self.context
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<QueueErrorKind> for QueueError {
    fn from(kind: QueueErrorKind) -> Self {
        QueueError::new(kind)
    }
}

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant names the broker interaction that failed. They surface to
/// queue callers as `QueueErrorKind::Adapter`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error fetching a message from a queue
    #[error("failure to get message from queue `{0}`")]
    GetMessageError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error purging a queue
    #[error("failure to purge queue `{0}`")]
    PurgeError(String),

    /// The message identifier is not an AMQP delivery tag
    #[error("invalid delivery tag `{0}`")]
    InvalidDeliveryTag(String),

    /// The delivery came from a channel that has since been replaced
    #[error("delivery tag `{0}` belongs to a closed channel")]
    StaleDelivery(String),
}

impl From<AmqpError> for QueueError {
    fn from(err: AmqpError) -> Self {
        QueueError::adapter(err.to_string())
    }
}
