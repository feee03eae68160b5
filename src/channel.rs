// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! Establishes the connection and channel the AMQP adapter talks through, and
//! declares the exchange/queue pair it publishes to and reads from.

use crate::{config::AmqpConfig, errors::AmqpError};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates a new AMQP channel for communication with RabbitMQ.
///
/// Both the connection and the channel are returned; the connection must be
/// kept alive for as long as the channel is used.
///
/// # Parameters
/// * `cfg` - Connection details like host, port and credentials
///
/// # Returns
/// A tuple containing the connection and channel on success, or an error on failure.
pub async fn new_amqp_channel(
    cfg: &AmqpConfig,
) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.connection_name.clone()));

    let conn = match Connection::connect(&cfg.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError {})
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError {})
        }
    }
}

/// Declares the configured durable exchange and queue and binds them.
///
/// The binding uses the configured routing key, or an empty one when none is
/// set.
pub async fn declare_topology(channel: &Channel, cfg: &AmqpConfig) -> Result<(), AmqpError> {
    debug!("creating exchange: {}", cfg.exchange);
    match channel
        .exchange_declare(
            &cfg.exchange,
            (&cfg.exchange_kind).into(),
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = cfg.exchange.as_str(),
                "error to declare the exchange"
            );
            Err(AmqpError::DeclareExchangeError(cfg.exchange.clone()))
        }
        _ => Ok(()),
    }?;

    debug!("creating queue: {}", cfg.queue);
    match channel
        .queue_declare(
            &cfg.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = cfg.queue.as_str(),
                "error to declare the queue"
            );
            Err(AmqpError::DeclareQueueError(cfg.queue.clone()))
        }
        _ => Ok(()),
    }?;

    let routing_key = cfg.routing_key.as_deref().unwrap_or_default();
    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        cfg.queue, cfg.exchange, routing_key
    );

    match channel
        .queue_bind(
            &cfg.queue,
            &cfg.exchange,
            routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to bind queue to exchange");
            Err(AmqpError::BindingExchangeToQueueError(
                cfg.exchange.clone(),
                cfg.queue.clone(),
            ))
        }
        _ => Ok(()),
    }
}
