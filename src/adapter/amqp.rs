// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Adapter
//!
//! Implements the adapter contract on top of a single AMQP channel. The
//! connection is opened lazily on first use, at which point the configured
//! exchange and queue are declared and bound.
//!
//! Messages are fetched with `basic.get` in manual-ack mode. A message that is
//! never acked stays unacknowledged on the channel and is redelivered by the
//! broker once the channel or connection closes.
//!
//! When the channel is found closed the next operation opens a new session.
//! Delivery tags are scoped to the channel that produced them, so each
//! dequeued message records the session it came from and acking it after a
//! reconnect fails with `AmqpError::StaleDelivery` instead of acking an
//! unrelated delivery.

use super::{Adapter, Dequeued};
use crate::{
    channel::{declare_topology, new_amqp_channel},
    config::AmqpConfig,
    errors::{AmqpError, QueueError},
    message::Internals,
    otel,
};
use async_trait::async_trait;
use lapin::{
    options::{BasicAckOptions, BasicGetOptions, BasicPublishOptions, QueuePurgeOptions},
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection,
};
use opentelemetry::Context;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Default content type for the JSON message records the queue produces
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Internals key telling whether the broker flagged a delivery as redelivered
pub const AMQP_INTERNALS_REDELIVERED: &str = "x-redelivered";
/// Internals key holding the session a delivery was received on
pub const AMQP_INTERNALS_SESSION: &str = "x-session";

const PERSISTENT_DELIVERY_MODE: u8 = 2;

struct AmqpSession {
    _connection: Arc<Connection>,
    channel: Arc<Channel>,
}

#[derive(Default)]
struct SessionState {
    session: Option<AmqpSession>,
    generation: u64,
}

/// Adapter backed by a RabbitMQ queue.
///
/// A failed connection attempt is not remembered: the next operation tries
/// again.
pub struct AmqpAdapter {
    cfg: AmqpConfig,
    state: Mutex<SessionState>,
}

impl AmqpAdapter {
    /// Creates an adapter; no connection is made until the first operation.
    pub fn new(cfg: AmqpConfig) -> AmqpAdapter {
        AmqpAdapter {
            cfg,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Returns the open channel and its session generation, reconnecting
    /// when there is no session yet or the current channel is closed.
    async fn channel(&self) -> Result<(Arc<Channel>, u64), AmqpError> {
        let mut state = self.state.lock().await;

        match &state.session {
            Some(session) if session.channel.status().connected() => {
                return Ok((session.channel.clone(), state.generation));
            }
            Some(_) => {
                warn!(
                    generation = state.generation,
                    "amqp channel is closed, reconnecting"
                );
                state.session = None;
            }
            None => {}
        }

        let (connection, channel) = new_amqp_channel(&self.cfg).await?;
        declare_topology(&channel, &self.cfg).await?;

        state.generation += 1;
        state.session = Some(AmqpSession {
            _connection: connection,
            channel: channel.clone(),
        });

        Ok((channel, state.generation))
    }

    #[cfg(test)]
    async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Messages are routed by topic only when a routing key is configured.
    fn routing_key<'a>(&self, topic: &'a str) -> &'a str {
        if self.cfg.routing_key.is_some() {
            topic
        } else {
            ""
        }
    }
}

#[async_trait]
impl Adapter for AmqpAdapter {
    async fn enqueue(&self, body: &[u8], topic: &str) -> Result<(), QueueError> {
        let (channel, _) = self.channel().await?;
        let headers = otel::inject_headers(&Context::current());

        match channel
            .basic_publish(
                &self.cfg.exchange,
                self.routing_key(topic),
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                body,
                BasicProperties::default()
                    .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
                    .with_type(ShortString::from(topic))
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_headers(FieldTable::from(headers)),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), topic, "error publishing message");
                Err(AmqpError::PublishingError.into())
            }
            _ => Ok(()),
        }
    }

    async fn dequeue(&self) -> Result<Option<Dequeued>, QueueError> {
        let (channel, generation) = self.channel().await?;

        let msg = match channel
            .basic_get(&self.cfg.queue, BasicGetOptions { no_ack: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "failure to get message");
                Err(AmqpError::GetMessageError(self.cfg.queue.clone()))
            }
            Ok(msg) => Ok(msg),
        }?;

        let Some(msg) = msg else {
            return Ok(None);
        };

        let delivery = msg.delivery;
        debug!(
            "received: {} - exchange: {}",
            delivery.delivery_tag,
            delivery.exchange.as_str()
        );

        let mut internals = match delivery.properties.headers() {
            Some(headers) => otel::headers_to_internals(headers.inner()),
            None => Internals::default(),
        };
        internals.insert(
            AMQP_INTERNALS_REDELIVERED.to_owned(),
            Value::Bool(delivery.redelivered),
        );
        internals.insert(AMQP_INTERNALS_SESSION.to_owned(), Value::from(generation));

        Ok(Some(Dequeued {
            body: delivery.data,
            identifier: delivery.delivery_tag.to_string(),
            internals,
        }))
    }

    async fn ack(&self, identifier: &str, internals: &Internals) -> Result<(), QueueError> {
        let delivery_tag: u64 = identifier
            .parse()
            .map_err(|_| AmqpError::InvalidDeliveryTag(identifier.to_owned()))?;

        let (channel, generation) = self.channel().await?;
        ensure_same_session(identifier, internals, generation)?;
        match channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(AmqpError::AckMessageError.into())
            }
            _ => Ok(()),
        }
    }

    async fn purge(&self) -> Result<(), QueueError> {
        let (channel, _) = self.channel().await?;
        match channel
            .queue_purge(&self.cfg.queue, QueuePurgeOptions { nowait: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error purging queue");
                Err(AmqpError::PurgeError(self.cfg.queue.clone()).into())
            }
            Ok(count) => {
                debug!("purged {} messages from queue: {}", count, self.cfg.queue);
                Ok(())
            }
        }
    }
}

/// Deliveries without a recorded session are passed through to the broker.
fn ensure_same_session(
    identifier: &str,
    internals: &Internals,
    generation: u64,
) -> Result<(), AmqpError> {
    match internals.get(AMQP_INTERNALS_SESSION).and_then(Value::as_u64) {
        Some(received_on) if received_on != generation => {
            warn!(
                identifier,
                received_on, generation, "refusing to ack a delivery from a closed channel"
            );
            Err(AmqpError::StaleDelivery(identifier.to_owned()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QueueErrorKind;

    #[test]
    fn routes_by_topic_only_with_routing_key() {
        let adapter = AmqpAdapter::new(AmqpConfig::default());
        assert_eq!(adapter.routing_key("orders"), "");

        let adapter = AmqpAdapter::new(AmqpConfig {
            routing_key: Some("#".to_owned()),
            ..AmqpConfig::default()
        });
        assert_eq!(adapter.routing_key("orders"), "orders");
    }

    #[tokio::test]
    async fn ack_rejects_non_numeric_identifier_before_connecting() {
        let adapter = AmqpAdapter::new(AmqpConfig::default());
        let err = adapter.ack("abc", &Internals::default()).await.unwrap_err();

        assert_eq!(
            err.kind(),
            &QueueErrorKind::Adapter("invalid delivery tag `abc`".to_owned())
        );
    }

    #[test]
    fn deliveries_from_a_replaced_session_are_stale() {
        let mut internals = Internals::default();
        assert_eq!(ensure_same_session("7", &internals, 3), Ok(()));

        internals.insert(AMQP_INTERNALS_SESSION.to_owned(), Value::from(3));
        assert_eq!(ensure_same_session("7", &internals, 3), Ok(()));
        assert_eq!(
            ensure_same_session("7", &internals, 4),
            Err(AmqpError::StaleDelivery("7".to_owned()))
        );
    }

    #[tokio::test]
    async fn failed_connection_is_retried_on_next_operation() {
        let adapter = AmqpAdapter::new(AmqpConfig {
            host: "127.0.0.1".to_owned(),
            port: 1,
            ..AmqpConfig::default()
        });

        for _ in 0..2 {
            let err = adapter.purge().await.unwrap_err();
            assert_eq!(
                err.kind(),
                &QueueErrorKind::Adapter("failure to connect".to_owned())
            );
        }
        assert_eq!(adapter.generation().await, 0);
    }
}
