// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Processor
//!
//! The `Processor` pulls one message at a time from its queue and routes it to
//! the first registered handler willing to take it. Handlers are consulted in
//! registration order. A successful result acks the message; an unsuccessful
//! one leaves it unacked so the adapter's redelivery policy applies.
//!
//! Each call to `process` performs at most one dequeue, dispatch and ack
//! cycle. There is no internal concurrency: to scale out, run more processors,
//! each with its own queue and adapter connection.

use crate::{errors::QueueError, event::QueueEvent, message::Message, queue::Queue};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of a single `MessageHandler::handle` call.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    successful: bool,
    data: Option<Value>,
}

impl HandlerResult {
    /// Creates a result without data.
    ///
    /// # Parameters
    /// * `successful` - Whether the message should be acked
    pub fn new(successful: bool) -> Self {
        HandlerResult {
            successful,
            data: None,
        }
    }

    /// A successful result; the message will be acked.
    pub fn success() -> Self {
        Self::new(true)
    }

    /// An unsuccessful result; the message is left unacked.
    pub fn failure() -> Self {
        Self::new(false)
    }

    /// Attaches arbitrary data to the result.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// Business logic for messages of one or more topics.
///
/// `handle` receives the queue so a handler can enqueue follow-up messages,
/// e.g. a retry or a fan-out, as part of handling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn will_handle(&self, message: &Message) -> bool;

    async fn handle(&self, message: &Message, queue: &Queue) -> Result<HandlerResult, QueueError>;
}

/// Dispatches queued messages to registered handlers, one per cycle.
pub struct Processor {
    queue: Arc<Queue>,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl Processor {
    /// Creates a processor with no handlers.
    ///
    /// # Parameters
    /// * `queue` - The queue to dequeue from, also handed to every handler
    pub fn new(queue: Arc<Queue>) -> Processor {
        Processor {
            queue,
            handlers: vec![],
        }
    }

    /// Returns the queue this processor reads from.
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Appends a handler. Earlier registrations take priority; duplicates are
    /// not detected.
    pub fn register_handler(&mut self, handler: Arc<dyn MessageHandler>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Runs one dequeue, dispatch and ack cycle.
    ///
    /// # Returns
    /// `Ok(false)` when the queue was empty, `Ok(true)` when a message was
    /// handled. Every error, including a failed dequeue, is returned.
    pub async fn process(&self) -> Result<bool, QueueError> {
        self.run(None::<fn(&Processor, QueueError)>).await
    }

    /// Runs one cycle, diverting a failed dequeue to `on_error`.
    ///
    /// Observers see a `QueueEvent::Error` for every failure, diverted or not.
    ///
    /// When the dequeue fails, `on_error` is called once with this processor
    /// and the error and `Ok(true)` is returned so the caller can decide
    /// whether to keep polling. Errors after the dequeue (no matching handler,
    /// handler failure, ack failure) are still returned, not diverted.
    pub async fn process_or_else<F>(&self, on_error: F) -> Result<bool, QueueError>
    where
        F: FnOnce(&Processor, QueueError),
    {
        self.run(Some(on_error)).await
    }

    /// Calls `process` for as long as `should_continue` returns true.
    ///
    /// The predicate is checked before every cycle. There is no sleep or
    /// backoff between cycles; put any in the predicate.
    pub async fn process_while<F>(&self, mut should_continue: F) -> Result<(), QueueError>
    where
        F: FnMut() -> bool,
    {
        while should_continue() {
            self.process().await?;
        }

        Ok(())
    }

    async fn run<F>(&self, on_error: Option<F>) -> Result<bool, QueueError>
    where
        F: FnOnce(&Processor, QueueError),
    {
        let message = match self.queue.dequeue().await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(false),
            Err(err) => {
                self.queue.notify(&QueueEvent::Error(&err));
                let Some(on_error) = on_error else {
                    return Err(err);
                };

                warn!(error = err.to_string(), "failure to dequeue, passing to error callback");
                on_error(self, err);
                return Ok(true);
            }
        };

        self.dispatch(message)
            .await
            .inspect_err(|err| self.queue.notify(&QueueEvent::Error(err)))
    }

    async fn dispatch(&self, message: Message) -> Result<bool, QueueError> {
        let Some(handler) = self.handlers.iter().find(|h| h.will_handle(&message)) else {
            error!(topic = message.topic(), "no handler will handle message");
            return Err(QueueError::no_handler(message.topic())
                .with_context(message.identifier().map(str::to_owned)));
        };

        let result = handler.handle(&message, &self.queue).await?;
        self.queue.notify(&QueueEvent::Handled {
            message: &message,
            result: &result,
        });

        if result.is_successful() {
            self.queue.ack(message).await?;
        } else {
            debug!(
                topic = message.topic(),
                identifier = message.identifier().unwrap_or_default(),
                "handler was not successful, leaving message unacked"
            );
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapter::{Dequeued, MockAdapter},
        data::SerializedData,
        errors::QueueErrorKind,
        message::Internals,
        queue::tests::RecordingObserver,
    };
    use serde_json::json;
    use uuid::Uuid;

    fn delivery(topic: &str, payload: Value, identifier: &str) -> Dequeued {
        let data = SerializedData::new("json", payload.to_string())
            .to_json()
            .unwrap();
        let body = serde_json::to_vec(&json!({
            "uuid": Uuid::new_v4(),
            "topic": topic,
            "data": data,
        }))
        .unwrap();

        Dequeued {
            body,
            identifier: identifier.to_owned(),
            internals: Internals::default(),
        }
    }

    fn adapter_with(delivery: Dequeued) -> MockAdapter {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_dequeue()
            .times(1)
            .returning(move || Ok(Some(delivery.clone())));
        adapter
    }

    fn banana() -> Value {
        json!({"banana": "is not just a banaana, banaana"})
    }

    #[tokio::test]
    async fn queue_returns_queue() {
        let queue = Arc::new(Queue::new(MockAdapter::new()));
        let processor = Processor::new(queue.clone());

        assert!(Arc::ptr_eq(processor.queue(), &queue));
    }

    #[tokio::test]
    async fn fails_when_no_handlers() {
        let mut adapter = adapter_with(delivery("test", banana(), "1"));
        adapter.expect_ack().never();

        let processor = Processor::new(Arc::new(Queue::new(adapter)));
        let err = processor.process().await.unwrap_err();

        assert_eq!(
            err.kind(),
            &QueueErrorKind::NoHandler {
                topic: "test".to_owned()
            }
        );
        assert_eq!(err.context(), &[json!("1")]);
    }

    #[tokio::test]
    async fn fails_when_no_handler_will_handle_message() {
        let mut adapter = adapter_with(delivery("test", banana(), "1"));
        adapter.expect_ack().never();

        let mut handler = MockMessageHandler::new();
        handler
            .expect_will_handle()
            .times(1)
            .withf(|msg| msg.topic() == "test" && msg.payload() == &banana())
            .return_const(false);
        handler.expect_handle().never();

        let mut processor = Processor::new(Arc::new(Queue::new(adapter)));
        processor.register_handler(Arc::new(handler));

        let err = processor.process().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "no handler will handle a message of topic `test`"
        );
    }

    async fn handle_with_result(successful: bool) {
        let mut adapter = adapter_with(delivery("test", banana(), "42"));
        if successful {
            adapter
                .expect_ack()
                .times(1)
                .withf(|identifier, _| identifier == "42")
                .returning(|_, _| Ok(()));
        } else {
            adapter.expect_ack().never();
        }

        let mut declining = MockMessageHandler::new();
        declining.expect_will_handle().times(1).return_const(false);
        declining.expect_handle().never();

        let mut accepting = MockMessageHandler::new();
        accepting.expect_will_handle().times(1).return_const(true);
        accepting
            .expect_handle()
            .times(1)
            .withf(|msg, _| msg.identifier() == Some("42") && msg.payload() == &banana())
            .returning(move |_, _| Ok(HandlerResult::new(successful)));

        let mut unreached = MockMessageHandler::new();
        unreached.expect_will_handle().never();
        unreached.expect_handle().never();

        let mut processor = Processor::new(Arc::new(Queue::new(adapter)));
        processor
            .register_handler(Arc::new(declining))
            .register_handler(Arc::new(accepting))
            .register_handler(Arc::new(unreached));

        assert!(processor.process().await.unwrap());
    }

    #[tokio::test]
    async fn successful_result_is_acked() {
        handle_with_result(true).await;
    }

    #[tokio::test]
    async fn unsuccessful_result_is_not_acked() {
        handle_with_result(false).await;
    }

    #[tokio::test]
    async fn exits_early_when_no_messages() {
        let mut adapter = MockAdapter::new();
        adapter.expect_dequeue().times(1).returning(|| Ok(None));
        adapter.expect_ack().never();

        let mut handler = MockMessageHandler::new();
        handler.expect_will_handle().never();
        handler.expect_handle().never();

        let mut processor = Processor::new(Arc::new(Queue::new(adapter)));
        processor.register_handler(Arc::new(handler));

        assert!(!processor.process().await.unwrap());
    }

    #[tokio::test]
    async fn process_while_processes_until_predicate_returns_false() {
        let mut adapter = MockAdapter::new();
        adapter.expect_dequeue().times(99).returning(|| Ok(None));

        let processor = Processor::new(Arc::new(Queue::new(adapter)));

        let mut checks = 0;
        processor
            .process_while(|| {
                checks += 1;
                checks < 100
            })
            .await
            .unwrap();

        assert_eq!(checks, 100);
    }

    #[tokio::test]
    async fn dequeue_error_goes_to_callback() {
        let mut adapter = MockAdapter::new();
        adapter.expect_dequeue().times(1).returning(|| {
            Err(QueueError::adapter("Xoo").with_context(["tussenhofer", "identificado"]))
        });

        let processor = Processor::new(Arc::new(Queue::new(adapter)));

        let mut calls = 0;
        let ret = processor
            .process_or_else(|p, err| {
                assert!(std::ptr::eq(p, &processor));
                assert_eq!(err.context(), &[json!("tussenhofer"), json!("identificado")]);
                calls += 1;
            })
            .await;

        assert_eq!(ret, Ok(true));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn dequeue_error_propagates_without_callback() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_dequeue()
            .times(1)
            .returning(|| Err(QueueError::adapter("Xoo")));

        let processor = Processor::new(Arc::new(Queue::new(adapter)));
        let err = processor.process().await.unwrap_err();

        assert_eq!(err.kind(), &QueueErrorKind::Adapter("Xoo".to_owned()));
    }

    #[tokio::test]
    async fn handler_errors_are_not_diverted_to_callback() {
        let mut adapter = adapter_with(delivery("test", banana(), "5"));
        adapter.expect_ack().never();

        let mut handler = MockMessageHandler::new();
        handler.expect_will_handle().return_const(true);
        handler
            .expect_handle()
            .times(1)
            .returning(|_, _| Err(QueueError::handler("boom")));

        let mut processor = Processor::new(Arc::new(Queue::new(adapter)));
        processor.register_handler(Arc::new(handler));

        let mut calls = 0;
        let err = processor
            .process_or_else(|_, _| calls += 1)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &QueueErrorKind::Handler("boom".to_owned()));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn no_handler_error_is_not_diverted_to_callback() {
        let processor = Processor::new(Arc::new(Queue::new(adapter_with(delivery(
            "orphan",
            json!(null),
            "9",
        )))));

        let mut calls = 0;
        let err = processor
            .process_or_else(|_, _| calls += 1)
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), QueueErrorKind::NoHandler { topic } if topic == "orphan"));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn handling_is_reported_to_observers() {
        let mut adapter = adapter_with(delivery("test", banana(), "8"));
        adapter.expect_ack().times(1).returning(|_, _| Ok(()));

        let mut handler = MockMessageHandler::new();
        handler.expect_will_handle().return_const(true);
        handler
            .expect_handle()
            .returning(|_, _| Ok(HandlerResult::success().with_data("done")));

        let observer = Arc::new(RecordingObserver::default());
        let queue = Queue::new(adapter).subscribe(observer.clone());
        let mut processor = Processor::new(Arc::new(queue));
        processor.register_handler(Arc::new(handler));

        assert!(processor.process().await.unwrap());
        assert_eq!(observer.names(), vec!["dequeued", "handled", "acked"]);
    }

    #[tokio::test]
    async fn failures_are_reported_to_observers() {
        async fn observed(
            adapter: MockAdapter,
            handler: Option<MockMessageHandler>,
            divert: bool,
        ) -> Vec<String> {
            let observer = Arc::new(RecordingObserver::default());
            let queue = Queue::new(adapter).subscribe(observer.clone());
            let mut processor = Processor::new(Arc::new(queue));
            if let Some(handler) = handler {
                processor.register_handler(Arc::new(handler));
            }

            if divert {
                assert_eq!(processor.process_or_else(|_, _| {}).await, Ok(true));
            } else {
                assert!(processor.process().await.is_err());
            }
            observer.names()
        }

        let failing_dequeue = || {
            let mut adapter = MockAdapter::new();
            adapter
                .expect_dequeue()
                .times(1)
                .returning(|| Err(QueueError::adapter("Xoo")));
            adapter
        };
        assert_eq!(observed(failing_dequeue(), None, true).await, vec!["error"]);
        assert_eq!(observed(failing_dequeue(), None, false).await, vec!["error"]);

        let adapter = adapter_with(delivery("orphan", json!(null), "1"));
        assert_eq!(
            observed(adapter, None, false).await,
            vec!["dequeued", "error"]
        );

        let mut failing = MockMessageHandler::new();
        failing.expect_will_handle().return_const(true);
        failing
            .expect_handle()
            .returning(|_, _| Err(QueueError::handler("boom")));
        let adapter = adapter_with(delivery("test", banana(), "2"));
        assert_eq!(
            observed(adapter, Some(failing), false).await,
            vec!["dequeued", "error"]
        );

        let mut succeeding = MockMessageHandler::new();
        succeeding.expect_will_handle().return_const(true);
        succeeding
            .expect_handle()
            .returning(|_, _| Ok(HandlerResult::success()));
        let mut adapter = adapter_with(delivery("test", banana(), "3"));
        adapter
            .expect_ack()
            .times(1)
            .returning(|_, _| Err(QueueError::adapter("gone")));
        assert_eq!(
            observed(adapter, Some(succeeding), false).await,
            vec!["dequeued", "handled", "error"]
        );
    }

    #[test]
    fn handler_result_carries_data() {
        let result = HandlerResult::failure().with_data(json!({"retry": true}));

        assert!(!result.is_successful());
        assert_eq!(result.data(), Some(&json!({"retry": true})));
        assert_eq!(HandlerResult::success().data(), None);
    }
}
