// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Lifecycle Notifications
//!
//! The queue and the processor report what they do to any number of attached
//! observers. Notifications are fire-and-forget: observers are called
//! synchronously, in attach order, and cannot fail the operation.

use crate::{errors::QueueError, message::Message, processor::HandlerResult};
use tracing::debug;

/// A lifecycle event emitted by a `Queue` or a `Processor`.
#[derive(Debug, Clone, Copy)]
pub enum QueueEvent<'a> {
    Enqueued(&'a Message),
    Dequeued(&'a Message),
    Handled {
        message: &'a Message,
        result: &'a HandlerResult,
    },
    Acked(&'a Message),
    Purged,
    /// A processing cycle failed, whether the error was diverted or returned.
    Error(&'a QueueError),
}

impl QueueEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued(_) => "enqueued",
            QueueEvent::Dequeued(_) => "dequeued",
            QueueEvent::Handled { .. } => "handled",
            QueueEvent::Acked(_) => "acked",
            QueueEvent::Purged => "purged",
            QueueEvent::Error(_) => "error",
        }
    }

    /// The message the event is about, if any.
    pub fn message(&self) -> Option<&Message> {
        match self {
            QueueEvent::Enqueued(m) | QueueEvent::Dequeued(m) | QueueEvent::Acked(m) => Some(*m),
            QueueEvent::Handled { message, .. } => Some(*message),
            QueueEvent::Purged | QueueEvent::Error(_) => None,
        }
    }
}

pub trait QueueObserver: Send + Sync {
    fn notify(&self, event: &QueueEvent<'_>);
}

/// Logs every lifecycle event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl QueueObserver for TracingObserver {
    fn notify(&self, event: &QueueEvent<'_>) {
        if let QueueEvent::Error(err) = event {
            debug!(
                event = event.name(),
                error = err.to_string(),
                context = format!("{:?}", err.context()),
                "queue event"
            );
            return;
        }

        match event.message() {
            Some(msg) => debug!(
                event = event.name(),
                topic = msg.topic(),
                uuid = msg.uuid().to_string(),
                identifier = msg.identifier().unwrap_or_default(),
                "queue event"
            ),
            None => debug!(event = event.name(), "queue event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_expose_their_message() {
        let msg = Message::create("test", json!(null));
        let result = HandlerResult::success();

        assert_eq!(QueueEvent::Enqueued(&msg).name(), "enqueued");
        assert_eq!(QueueEvent::Purged.message(), None);

        let handled = QueueEvent::Handled {
            message: &msg,
            result: &result,
        };
        assert_eq!(handled.name(), "handled");
        assert_eq!(handled.message(), Some(&msg));

        TracingObserver.notify(&handled);
        TracingObserver.notify(&QueueEvent::Purged);
    }

    #[test]
    fn error_events_carry_the_error() {
        let err = QueueError::adapter("down").with_context(["a"]);
        let event = QueueEvent::Error(&err);

        assert_eq!(event.name(), "error");
        assert_eq!(event.message(), None);
        assert!(matches!(event, QueueEvent::Error(e) if e.context() == [json!("a")]));

        TracingObserver.notify(&event);
    }
}
