//! Durable named queues and the worker that consumes them.
//!
//! Messages travel as a JSON [`QueueMessage`] envelope. The [`QueueWorker`]
//! runs one consumer per registered queue with manual acknowledgement:
//! a handler success acks, a handler error or timeout requeues after a
//! growing pause, and a body or payload that cannot be decoded is dropped
//! without requeue so it cannot loop.
//!
//! [`InMemoryBroker`] serves tests and single-process runs; with the
//! `kafka` feature, `KafkaBroker` talks to a Kafka-compatible cluster.

pub mod broker;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod worker;

pub use broker::{Broker, Delivery};
pub use error::{BrokerError, HandlerError, WorkerError};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaConfig};
pub use memory::{DroppedMessage, InMemoryBroker};
pub use message::QueueMessage;
pub use publisher::BrokerPublisher;
pub use worker::{MessageHandler, QueueWorker, WorkerConfig, handler_fn};
