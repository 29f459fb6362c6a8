//! Kafka-compatible [`Broker`] (Kafka, Redpanda) on `rdkafka`.
//!
//! Each queue is a topic read by one consumer in the configured group with
//! auto-commit disabled. An ack commits the message's offset. A nack with
//! requeue produces the body back onto the topic with a redelivery header,
//! then commits; without requeue the offset is committed and the message is
//! gone. Anything not yet settled when the process dies is read again from
//! the last committed offset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;

use crate::broker::{Broker, Delivery};
use crate::error::BrokerError;

const REDELIVERED_HEADER: &str = "x-redelivered";

/// Connection settings for [`KafkaBroker`].
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    pub group_id: String,
    /// Producer acknowledgement mode: `"all"` waits for every in-sync replica.
    pub acks: String,
    pub send_timeout: Duration,
    /// Where a new group starts reading.
    pub auto_offset_reset: String,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: "booking-coordination".to_string(),
            acks: "all".to_string(),
            send_timeout: Duration::from_secs(5),
            auto_offset_reset: "earliest".to_string(),
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    queue: String,
    partition: i32,
    offset: i64,
    body: Vec<u8>,
}

/// [`Broker`] over a Kafka-compatible cluster.
pub struct KafkaBroker {
    config: KafkaConfig,
    producer: FutureProducer,
    consumers: Mutex<HashMap<String, Arc<StreamConsumer>>>,
    in_flight: Mutex<HashMap<u64, InFlight>>,
    next_tag: AtomicU64,
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl KafkaBroker {
    /// Creates the producer. No connection is made until the first call.
    pub fn new(config: KafkaConfig) -> Result<Self, BrokerError> {
        if config.brokers.trim().is_empty() {
            return Err(BrokerError::ConnectionLost("no Kafka brokers configured".into()));
        }
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", &config.acks)
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", config.send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| BrokerError::ConnectionLost(format!("failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            acks = %config.acks,
            "Kafka broker configured"
        );
        Ok(Self {
            config,
            producer,
            consumers: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_tag: AtomicU64::new(1),
        })
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn consumer(&self, queue: &str) -> Result<Arc<StreamConsumer>, BrokerError> {
        lock(&self.consumers)
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))
    }

    async fn produce(&self, queue: &str, body: &[u8], redelivered: bool) -> Result<(), BrokerError> {
        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(queue).key(queue).payload(body);
        if redelivered {
            record = record.headers(OwnedHeaders::new().insert(Header {
                key: REDELIVERED_HEADER,
                value: Some("true"),
            }));
        }
        match self
            .producer
            .send(record, Timeout::After(self.config.send_timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(queue, partition, offset, redelivered, "message produced");
                Ok(())
            }
            Err((e, _)) => Err(BrokerError::ConnectionLost(format!("publish to {queue} failed: {e}"))),
        }
    }

    fn commit(&self, message: &InFlight) -> Result<(), BrokerError> {
        let consumer = self.consumer(&message.queue)?;
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.queue, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BrokerError::ConnectionLost(e.to_string()))?;
        consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::ConnectionLost(format!("commit failed: {e}")))
    }

    fn settle(&self, tag: u64) -> Result<InFlight, BrokerError> {
        lock(&self.in_flight)
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Broker for KafkaBroker {
    /// Subscribes the group to the topic. Topic creation is left to the
    /// cluster's auto-create setting or to provisioning.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        if lock(&self.consumers).contains_key(queue) {
            return Ok(());
        }
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| BrokerError::ConnectionLost(format!("failed to create consumer: {e}")))?;
        consumer
            .subscribe(&[queue])
            .map_err(|e| BrokerError::ConnectionLost(format!("failed to subscribe to {queue}: {e}")))?;

        tracing::info!(queue, group_id = %self.config.group_id, "subscribed to topic");
        lock(&self.consumers)
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(consumer));
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.produce(queue, &body, false).await
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, BrokerError> {
        let consumer = self.consumer(queue)?;
        let message = consumer
            .recv()
            .await
            .map_err(|e| BrokerError::ConnectionLost(format!("receive from {queue} failed: {e}")))?;

        let redelivered = message.headers().is_some_and(|headers| {
            headers
                .iter()
                .any(|header| header.key == REDELIVERED_HEADER)
        });
        let in_flight = InFlight {
            queue: queue.to_string(),
            partition: message.partition(),
            offset: message.offset(),
            body: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        };
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        lock(&self.in_flight).insert(tag, in_flight.clone());

        Ok(Delivery {
            tag,
            queue: in_flight.queue,
            body: in_flight.body,
            redelivered,
        })
    }

    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        let message = self.settle(tag)?;
        self.commit(&message)
    }

    /// Kafka has no per-message requeue, so a requeued body is produced again
    /// at the tail of its topic before the original offset is committed.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let message = self.settle(tag)?;
        if requeue {
            if let Err(e) = self.produce(&message.queue, &message.body, true).await {
                // Not committed, so the original is read again after a restart.
                lock(&self.in_flight).insert(tag, message);
                return Err(e);
            }
        } else {
            tracing::warn!(
                queue = %message.queue,
                partition = message.partition,
                offset = message.offset,
                "message discarded"
            );
        }
        self.commit(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_broker_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KafkaBroker>();
    }

    #[test]
    fn test_config_defaults() {
        let config = KafkaConfig::new("localhost:9092")
            .with_group_id("notifications")
            .with_send_timeout(Duration::from_secs(2));
        assert_eq!(config.group_id, "notifications");
        assert_eq!(config.acks, "all");
        assert_eq!(config.auto_offset_reset, "earliest");
        assert_eq!(config.send_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_broker_list_is_rejected() {
        assert!(matches!(
            KafkaBroker::new(KafkaConfig::new("  ")),
            Err(BrokerError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_undeclared_queue_and_unknown_tag() {
        // Creating the producer does not contact the cluster.
        let broker = KafkaBroker::new(KafkaConfig::new("localhost:9092")).unwrap();

        assert!(matches!(
            broker.receive("booking.notifications").await,
            Err(BrokerError::UnknownQueue(_))
        ));
        assert!(matches!(broker.ack(7).await, Err(BrokerError::UnknownDelivery(7))));
        assert!(matches!(
            broker.nack(7, true).await,
            Err(BrokerError::UnknownDelivery(7))
        ));
        assert_eq!(broker.in_flight_count(), 0);
    }
}
