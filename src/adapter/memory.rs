// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # In-Memory Adapter
//!
//! Keeps pending messages in FIFO order and delivered-but-unacked messages in
//! an in-flight map keyed by identifier. Dequeuing moves a message to
//! in-flight; only an ack forgets it. `recover` puts every in-flight message
//! back at the head of the pending queue, which is how an unacked message
//! becomes visible again (the equivalent of a consumer restart on a broker).

use super::{Adapter, Dequeued};
use crate::{errors::QueueError, message::Internals};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Internals key holding the topic a message was enqueued under.
pub const MEMORY_INTERNALS_TOPIC: &str = "topic";

#[derive(Debug, Clone)]
struct StoredMessage {
    sequence: u64,
    body: Vec<u8>,
    topic: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    pending: VecDeque<StoredMessage>,
    // keyed by sequence so recovery restores the original order
    in_flight: BTreeMap<u64, StoredMessage>,
    next_sequence: u64,
}

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        MemoryAdapter::default()
    }

    /// Number of messages waiting to be dequeued.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of dequeued messages not acked yet.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Makes every unacked message deliverable again, oldest first.
    ///
    /// # Returns
    /// The number of messages moved back to pending.
    pub async fn recover(&self) -> usize {
        let mut state = self.state.lock().await;
        let in_flight = std::mem::take(&mut state.in_flight);
        let count = in_flight.len();

        for (_, msg) in in_flight.into_iter().rev() {
            state.pending.push_front(msg);
        }

        debug!(count, "recovered unacked messages");
        count
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn enqueue(&self, body: &[u8], topic: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.next_sequence += 1;

        let msg = StoredMessage {
            sequence: state.next_sequence,
            body: body.to_vec(),
            topic: topic.to_owned(),
        };
        state.pending.push_back(msg);

        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Dequeued>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(msg) = state.pending.pop_front() else {
            return Ok(None);
        };

        let mut internals = Internals::default();
        internals.insert(
            MEMORY_INTERNALS_TOPIC.to_owned(),
            Value::String(msg.topic.clone()),
        );

        let dequeued = Dequeued {
            body: msg.body.clone(),
            identifier: msg.sequence.to_string(),
            internals,
        };
        state.in_flight.insert(msg.sequence, msg);

        Ok(Some(dequeued))
    }

    async fn ack(&self, identifier: &str, _internals: &Internals) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;

        let removed = identifier
            .parse::<u64>()
            .ok()
            .and_then(|sequence| state.in_flight.remove(&sequence));

        if removed.is_none() {
            warn!(identifier, "ack for unknown message ignored");
        }

        Ok(())
    }

    async fn purge(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.in_flight.clear();

        Ok(())
    }
}
