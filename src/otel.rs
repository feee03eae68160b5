// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Context Propagation
//!
//! The AMQP adapter injects the producer's trace context into message headers
//! and copies the string headers of a delivery into the message internals.
//! `parent_context` extracts that context again on the consumer side so a
//! handler can parent its span on the producer's.

use crate::message::{Internals, Message};
use lapin::types::{AMQPValue, ShortString};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

/// Injects OpenTelemetry context into outgoing RabbitMQ headers.
pub(crate) struct AmqpHeaderInjector<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> AmqpHeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for AmqpHeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Reads OpenTelemetry context from the internals of a dequeued message.
pub(crate) struct InternalsExtractor<'a> {
    internals: &'a Internals,
}

impl<'a> InternalsExtractor<'a> {
    pub(crate) fn new(internals: &'a Internals) -> Self {
        Self { internals }
    }
}

impl Extractor for InternalsExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.internals.get(key).and_then(Value::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.internals.keys().map(String::as_str).collect()
    }
}

/// Injects the given context into a fresh header table using the global propagator.
pub(crate) fn inject_headers(ctx: &Context) -> BTreeMap<ShortString, AMQPValue> {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut AmqpHeaderInjector::new(&mut headers))
    });

    headers
}

/// Converts the string-valued headers of a delivery into message internals.
pub(crate) fn headers_to_internals(headers: &BTreeMap<ShortString, AMQPValue>) -> Internals {
    let mut internals = Internals::default();

    for (key, value) in headers {
        let text = match value {
            AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes())
                .map_err(|e| error!("Error decoding header value {:?}", e))
                .ok()
                .map(str::to_owned),
            AMQPValue::ShortString(s) => Some(s.as_str().to_owned()),
            _ => None,
        };

        if let Some(text) = text {
            internals.insert(key.as_str().to_owned(), Value::String(text));
        }
    }

    internals
}

/// Extracts the producer's trace context from a dequeued message.
///
/// Returns an empty context when the message carries none.
pub fn parent_context(message: &Message) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&InternalsExtractor::new(message.internals()))
    })
}
