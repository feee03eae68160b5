// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Adapters
//!
//! An `Adapter` is the minimal contract a backend must satisfy to give
//! callers at-least-once delivery: enqueue, a non-blocking dequeue of at most
//! one message, acknowledgement, and purge. The `Queue` is the only caller;
//! it owns the adapter and handles (de)serialization around it.
//!
//! Two backends ship with the crate:
//! - `memory::MemoryAdapter`: process-local, used by tests and demos
//! - `amqp::AmqpAdapter`: RabbitMQ through `lapin`

use crate::{errors::QueueError, message::Internals};
use async_trait::async_trait;
use std::sync::Arc;

pub mod amqp;
pub mod memory;

/// A raw message handed out by an adapter's `dequeue`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dequeued {
    pub body: Vec<u8>,
    pub identifier: String,
    pub internals: Internals,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Publishes `body` under `topic`.
    ///
    /// A transient failure must be reported as an error, never dropped.
    async fn enqueue(&self, body: &[u8], topic: &str) -> Result<(), QueueError>;

    /// Pops at most one message without blocking.
    ///
    /// # Returns
    /// `Ok(None)` when nothing is pending, which is not an error.
    async fn dequeue(&self) -> Result<Option<Dequeued>, QueueError>;

    /// Marks a delivered message as permanently consumed.
    ///
    /// Acking an unknown or already acked identifier is backend-defined but
    /// must leave the backend in a consistent state.
    async fn ack(&self, identifier: &str, internals: &Internals) -> Result<(), QueueError>;

    /// Discards every pending message.
    async fn purge(&self) -> Result<(), QueueError>;
}

/// Lets a caller keep a handle on the backend it hands to a `Queue`, e.g. to
/// inspect an in-memory adapter.
#[async_trait]
impl<A: Adapter + ?Sized> Adapter for Arc<A> {
    async fn enqueue(&self, body: &[u8], topic: &str) -> Result<(), QueueError> {
        (**self).enqueue(body, topic).await
    }

    async fn dequeue(&self) -> Result<Option<Dequeued>, QueueError> {
        (**self).dequeue().await
    }

    async fn ack(&self, identifier: &str, internals: &Internals) -> Result<(), QueueError> {
        (**self).ack(identifier, internals).await
    }

    async fn purge(&self) -> Result<(), QueueError> {
        (**self).purge().await
    }
}
