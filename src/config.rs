// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Adapter Configuration
//!
//! Connection parameters and the exchange/queue layout used by the RabbitMQ
//! adapter. A configuration can be deserialized from any serde source or read
//! from `RABBITMQ_*` environment variables.

use crate::errors::QueueError;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::{env, str::FromStr};

pub const ENV_HOST: &str = "RABBITMQ_HOST";
pub const ENV_PORT: &str = "RABBITMQ_PORT";
pub const ENV_USER: &str = "RABBITMQ_USER";
pub const ENV_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_VHOST: &str = "RABBITMQ_VHOST";
pub const ENV_APP_NAME: &str = "APP_NAME";
pub const ENV_EXCHANGE: &str = "RABBITMQ_EXCHANGE";
pub const ENV_EXCHANGE_KIND: &str = "RABBITMQ_EXCHANGE_KIND";
pub const ENV_QUEUE: &str = "RABBITMQ_QUEUE";
pub const ENV_ROUTING_KEY: &str = "RABBITMQ_ROUTING_KEY";

/// Represents the types of exchanges the adapter can declare.
///
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            other => Err(QueueError::configuration(format!(
                "unknown exchange kind `{other}`"
            ))),
        }
    }
}

/// Settings for the RabbitMQ-backed adapter.
///
/// When `routing_key` is set the queue is bound with it and every message is
/// published with its topic as routing key; otherwise messages are published
/// with an empty routing key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub connection_name: String,
    pub exchange: String,
    pub exchange_kind: ExchangeKind,
    pub queue: String,
    pub routing_key: Option<String>,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        AmqpConfig {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            connection_name: "courier".to_owned(),
            exchange: "courier".to_owned(),
            exchange_kind: ExchangeKind::Direct,
            queue: "courier".to_owned(),
            routing_key: None,
        }
    }
}

impl AmqpConfig {
    /// Builds a configuration from the process environment.
    ///
    /// Unset variables keep their default value. An unparseable port or
    /// exchange kind is reported as a configuration error.
    pub fn from_env() -> Result<AmqpConfig, QueueError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<AmqpConfig, QueueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AmqpConfig::default();

        if let Some(host) = lookup(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            cfg.port = port.parse().map_err(|_| {
                QueueError::configuration(format!("invalid port `{port}`"))
                    .push_context(ENV_PORT)
            })?;
        }
        if let Some(user) = lookup(ENV_USER) {
            cfg.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            cfg.password = password;
        }
        if let Some(vhost) = lookup(ENV_VHOST) {
            cfg.vhost = vhost;
        }
        if let Some(name) = lookup(ENV_APP_NAME) {
            cfg.connection_name = name;
        }
        if let Some(exchange) = lookup(ENV_EXCHANGE) {
            cfg.exchange = exchange;
        }
        if let Some(kind) = lookup(ENV_EXCHANGE_KIND) {
            cfg.exchange_kind = kind.parse()?;
        }
        if let Some(queue) = lookup(ENV_QUEUE) {
            cfg.queue = queue;
        }
        cfg.routing_key = lookup(ENV_ROUTING_KEY).filter(|key| !key.is_empty());

        Ok(cfg)
    }

    /// Returns the AMQP URI for this configuration.
    ///
    /// Credentials and vhost are percent-encoded, so the default vhost `/`
    /// becomes `%2F` and a password may contain `@`, `:` or `/`.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.password, NON_ALPHANUMERIC),
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, NON_ALPHANUMERIC)
        )
    }
}
