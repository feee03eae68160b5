// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Courier
//!
//! A broker-agnostic message queue client. A `Queue` moves messages through a
//! pluggable `Adapter` (RabbitMQ or in-memory), and a `Processor` pulls them
//! one at a time and routes each to the first `MessageHandler` that accepts
//! it, acking only on success.
//!
//! ```no_run
//! use courier::{
//!     adapter::memory::MemoryAdapter, HandlerResult, Message, MessageHandler, Processor, Queue,
//!     QueueError,
//! };
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for Greeter {
//!     fn will_handle(&self, message: &Message) -> bool {
//!         message.topic() == "greet"
//!     }
//!
//!     async fn handle(
//!         &self,
//!         message: &Message,
//!         _queue: &Queue,
//!     ) -> Result<HandlerResult, QueueError> {
//!         println!("hello {}", message.payload());
//!         Ok(HandlerResult::success())
//!     }
//! }
//!
//! # async fn run() -> Result<(), QueueError> {
//! let queue = Arc::new(Queue::new(MemoryAdapter::new()));
//! queue.enqueue("world", "greet").await?;
//!
//! let mut processor = Processor::new(queue);
//! processor.register_handler(Arc::new(Greeter));
//! while processor.process().await? {}
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod channel;
pub mod config;
pub mod data;
pub mod errors;
pub mod event;
pub mod message;
pub mod otel;
pub mod processor;
pub mod queue;
pub mod serializer;

pub use adapter::{Adapter, Dequeued};
pub use data::SerializedData;
pub use errors::{QueueError, QueueErrorKind};
pub use event::{QueueEvent, QueueObserver, TracingObserver};
pub use message::{Internals, Message};
pub use processor::{HandlerResult, MessageHandler, Processor};
pub use queue::Queue;
