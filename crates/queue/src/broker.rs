//! Broker port.

use async_trait::async_trait;

use crate::error::BrokerError;

/// A message handed to a consumer and awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub queue: String,
    pub body: Vec<u8>,
    /// Set when the message was delivered before and not acknowledged.
    pub redelivered: bool,
}

/// Durable named queues with manual acknowledgement.
///
/// `receive` waits until a message is ready and must be cancel-safe: dropping
/// the future before it resolves must not lose a message.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publishes a persistent message.
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;

    async fn receive(&self, queue: &str) -> Result<Delivery, BrokerError>;

    async fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    /// Negatively acknowledges a delivery. With `requeue` the message is
    /// delivered again later, otherwise it is discarded.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError>;
}
