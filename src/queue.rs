// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue
//!
//! The `Queue` owns one adapter and is the single entry point for moving
//! messages: it serializes payloads on the way in, decodes them on the way
//! out, and reports every operation to the attached observers.
//!
//! On the wire each message is a JSON record carrying the message UUID, its
//! topic and the serialized payload envelope:
//!
//! ```json
//! {"uuid":"…","topic":"orders","data":"{\"serializerIdentifier\":\"json\",\"data\":\"…\"}"}
//! ```

use crate::{
    adapter::Adapter,
    data::SerializedData,
    errors::QueueError,
    event::{QueueEvent, QueueObserver},
    message::Message,
    serializer::DataSerializer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Serialize, Deserialize)]
struct MessageRecord {
    uuid: Uuid,
    topic: String,
    data: String,
}

pub struct Queue {
    adapter: Box<dyn Adapter>,
    serializer: DataSerializer,
    observers: Vec<Arc<dyn QueueObserver>>,
}

impl Queue {
    /// Creates a queue over `adapter` with the default JSON serializer chain.
    pub fn new<A: Adapter + 'static>(adapter: A) -> Queue {
        Queue {
            adapter: Box::new(adapter),
            serializer: DataSerializer::default(),
            observers: vec![],
        }
    }

    /// Replaces the serializer chain.
    pub fn with_serializer(mut self, serializer: DataSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Attaches an observer for lifecycle notifications.
    pub fn subscribe(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Serializes `payload` and publishes it under `topic`.
    ///
    /// # Returns
    /// The message that was enqueued. It has no delivery identifier; that is
    /// assigned when the message is dequeued.
    pub async fn enqueue<T>(&self, payload: &T, topic: &str) -> Result<Message, QueueError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload).map_err(|err| {
            QueueError::serialization(err.to_string()).push_context(topic)
        })?;
        let message = Message::create(topic, payload);

        let record = MessageRecord {
            uuid: message.uuid(),
            topic: message.topic().to_owned(),
            data: self.serializer.serialize(message.payload())?.to_json()?,
        };
        let body = serde_json::to_vec(&record)
            .map_err(|err| QueueError::serialization(err.to_string()).push_context(topic))?;

        self.adapter.enqueue(&body, topic).await?;
        self.notify(&QueueEvent::Enqueued(&message));

        Ok(message)
    }

    /// Takes the next message off the queue.
    ///
    /// # Returns
    /// `Ok(None)` when the queue is empty. A message that cannot be decoded is
    /// an error carrying its delivery identifier as context; it has already
    /// left the pending set and will not be acked.
    pub async fn dequeue(&self) -> Result<Option<Message>, QueueError> {
        let Some(dequeued) = self.adapter.dequeue().await? else {
            return Ok(None);
        };

        let decoded = serde_json::from_slice::<MessageRecord>(&dequeued.body)
            .map_err(|err| QueueError::deserialization(format!("invalid message record: {err}")))
            .and_then(|record| {
                let data = SerializedData::from_json(&record.data)?;
                let payload = self.serializer.unserialize(&data)?;
                Ok((record, payload))
            });

        let (record, payload) = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    identifier = dequeued.identifier.as_str(),
                    "failure to decode dequeued message"
                );
                return Err(err.push_context(dequeued.identifier));
            }
        };

        let message = Message::delivered(
            record.uuid,
            record.topic,
            payload,
            dequeued.identifier,
            dequeued.internals,
        );
        self.notify(&QueueEvent::Dequeued(&message));

        Ok(Some(message))
    }

    /// Acknowledges a dequeued message, consuming it.
    pub async fn ack(&self, message: Message) -> Result<(), QueueError> {
        let Some(identifier) = message.identifier() else {
            return Err(QueueError::adapter("message was never dequeued")
                .push_context(message.uuid().to_string()));
        };

        self.adapter.ack(identifier, message.internals()).await?;
        self.notify(&QueueEvent::Acked(&message));

        Ok(())
    }

    /// Discards every pending message.
    pub async fn purge(&self) -> Result<(), QueueError> {
        self.adapter.purge().await?;
        self.notify(&QueueEvent::Purged);

        Ok(())
    }

    pub(crate) fn notify(&self, event: &QueueEvent<'_>) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        adapter::{memory::MemoryAdapter, Dequeued, MockAdapter},
        errors::QueueErrorKind,
        message::Internals,
        serializer::{StringSerializer, STRING_SERIALIZER},
    };
    use serde_json::json;
    use std::sync::Mutex;

    /// Records the names of the events it sees.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub(crate) fn names(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl QueueObserver for RecordingObserver {
        fn notify(&self, event: &QueueEvent<'_>) {
            self.events.lock().unwrap().push(event.name().to_owned());
        }
    }

    #[tokio::test]
    async fn enqueued_messages_come_back_intact() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = Queue::new(MemoryAdapter::new()).subscribe(observer.clone());

        let payload = json!({"banana": "is not just a banaana, banaana"});
        let sent = queue.enqueue(&payload, "test").await.unwrap();
        let received = queue.dequeue().await.unwrap().unwrap();

        assert_eq!(received.uuid(), sent.uuid());
        assert_eq!(received.topic(), "test");
        assert_eq!(received.payload(), &payload);
        assert!(received.identifier().is_some());

        queue.ack(received).await.unwrap();
        queue.purge().await.unwrap();

        assert_eq!(
            observer.names(),
            vec!["enqueued", "dequeued", "acked", "purged"]
        );
    }

    #[tokio::test]
    async fn empty_queue_dequeues_none() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = Queue::new(MemoryAdapter::new()).subscribe(observer.clone());

        assert_eq!(queue.dequeue().await.unwrap(), None);
        assert!(observer.names().is_empty());
    }

    #[tokio::test]
    async fn uses_configured_serializer_chain() {
        let adapter = Arc::new(MemoryAdapter::new());
        let queue = Queue::new(adapter.clone())
            .with_serializer(
                DataSerializer::default()
                    .prepend(Arc::new(StringSerializer))
                    .unwrap(),
            );

        queue.enqueue("plain text", "notes").await.unwrap();

        let raw = adapter.dequeue().await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&raw.body).unwrap();
        let envelope = SerializedData::from_json(record["data"].as_str().unwrap()).unwrap();

        assert_eq!(record["topic"], "notes");
        assert_eq!(envelope.serializer_identifier(), STRING_SERIALIZER);
        assert_eq!(envelope.data(), b"plain text");
    }

    #[tokio::test]
    async fn undecodable_body_is_a_deserialization_error() {
        let mut adapter = MockAdapter::new();
        adapter.expect_dequeue().times(1).returning(|| {
            Ok(Some(Dequeued {
                body: b"not json".to_vec(),
                identifier: "17".to_owned(),
                internals: Internals::default(),
            }))
        });
        adapter.expect_ack().never();

        let err = Queue::new(adapter).dequeue().await.unwrap_err();

        assert!(matches!(err.kind(), QueueErrorKind::Deserialization(_)));
        assert_eq!(err.context(), &[json!("17")]);
    }

    #[tokio::test]
    async fn unknown_serializer_is_a_deserialization_error() {
        let envelope = SerializedData::new("php", "a:0:{}").to_json().unwrap();
        let body = serde_json::to_vec(&json!({
            "uuid": Uuid::new_v4(),
            "topic": "test",
            "data": envelope,
        }))
        .unwrap();

        let mut adapter = MockAdapter::new();
        adapter.expect_dequeue().times(1).returning(move || {
            Ok(Some(Dequeued {
                body: body.clone(),
                identifier: "3".to_owned(),
                internals: Internals::default(),
            }))
        });

        let err = Queue::new(adapter).dequeue().await.unwrap_err();

        assert!(matches!(err.kind(), QueueErrorKind::Deserialization(_)));
        assert_eq!(err.context(), &[json!("php"), json!("3")]);
    }

    #[tokio::test]
    async fn adapter_errors_propagate_from_enqueue() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_enqueue()
            .times(1)
            .returning(|_, _| Err(QueueError::adapter("broker unavailable")));

        let observer = Arc::new(RecordingObserver::default());
        let err = Queue::new(adapter)
            .subscribe(observer.clone())
            .enqueue(&json!(1), "test")
            .await
            .unwrap_err();

        assert_eq!(
            err.kind(),
            &QueueErrorKind::Adapter("broker unavailable".to_owned())
        );
        assert!(observer.names().is_empty());
    }

    #[tokio::test]
    async fn ack_requires_a_delivered_message() {
        let mut adapter = MockAdapter::new();
        adapter.expect_ack().never();

        let message = Message::create("test", json!(null));
        let uuid = message.uuid();
        let err = Queue::new(adapter).ack(message).await.unwrap_err();

        assert!(matches!(err.kind(), QueueErrorKind::Adapter(_)));
        assert_eq!(err.context(), &[json!(uuid.to_string())]);
    }
}
