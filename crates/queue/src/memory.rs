//! In-process broker with the acknowledgement semantics of a durable queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::broker::{Broker, Delivery};
use crate::error::BrokerError;

#[derive(Debug, Clone)]
struct Stored {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Clone)]
struct Unacked {
    queue: String,
    body: Vec<u8>,
}

/// A message that was negatively acknowledged without requeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedMessage {
    pub queue: String,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Stored>>,
    unacked: HashMap<u64, Unacked>,
    dropped: Vec<DroppedMessage>,
    next_tag: u64,
    acked: usize,
    connected: bool,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            unacked: HashMap::new(),
            dropped: Vec::new(),
            next_tag: 1,
            acked: 0,
            connected: true,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<BrokerState>,
    ready: Notify,
}

/// In-memory [`Broker`].
///
/// Unacknowledged messages are tracked per delivery tag. Dropping the
/// connection with [`InMemoryBroker::disconnect`] returns them to the head of
/// their queues flagged as redelivered, the way a real broker does when a
/// channel closes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a broker outage.
    pub fn disconnect(&self) {
        {
            let mut state = self.state();
            state.connected = false;
            let mut unacked: Vec<_> = state.unacked.drain().collect();
            unacked.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
            for (_, message) in unacked {
                if let Some(queue) = state.queues.get_mut(&message.queue) {
                    queue.push_front(Stored {
                        body: message.body,
                        redelivered: true,
                    });
                }
            }
        }
        tracing::warn!("in-memory broker disconnected");
        self.inner.ready.notify_waiters();
    }

    pub fn reconnect(&self) {
        self.state().connected = true;
        tracing::info!("in-memory broker reconnected");
        self.inner.ready.notify_waiters();
    }

    /// Messages ready for delivery on `queue`.
    pub fn depth(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn unacked_count(&self) -> usize {
        self.state().unacked.len()
    }

    pub fn acked_count(&self) -> usize {
        self.state().acked
    }

    pub fn dropped(&self) -> Vec<DroppedMessage> {
        self.state().dropped.clone()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_take(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.state();
        if !state.connected {
            return Err(BrokerError::ConnectionLost("broker unreachable".into()));
        }
        let Some(stored) = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?
            .pop_front()
        else {
            return Ok(None);
        };

        let tag = state.next_tag;
        state.next_tag += 1;
        state.unacked.insert(
            tag,
            Unacked {
                queue: queue.to_string(),
                body: stored.body.clone(),
            },
        );
        Ok(Some(Delivery {
            tag,
            queue: queue.to_string(),
            body: stored.body,
            redelivered: stored.redelivered,
        }))
    }

    fn settle(&self, tag: u64) -> Result<Unacked, BrokerError> {
        let mut state = self.state();
        if !state.connected {
            return Err(BrokerError::ConnectionLost("broker unreachable".into()));
        }
        state
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.state();
        if !state.connected {
            return Err(BrokerError::ConnectionLost("broker unreachable".into()));
        }
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            if !state.connected {
                return Err(BrokerError::ConnectionLost("broker unreachable".into()));
            }
            state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?
                .push_back(Stored {
                    body,
                    redelivered: false,
                });
        }
        self.inner.ready.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, BrokerError> {
        loop {
            // Registered before the check so a publish in between is not missed.
            let ready = self.inner.ready.notified();
            if let Some(delivery) = self.try_take(queue)? {
                return Ok(delivery);
            }
            ready.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.settle(tag)?;
        self.state().acked += 1;
        Ok(())
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let message = self.settle(tag)?;
        {
            let mut state = self.state();
            if requeue {
                if let Some(queue) = state.queues.get_mut(&message.queue) {
                    queue.push_front(Stored {
                        body: message.body,
                        redelivered: true,
                    });
                }
            } else {
                state.dropped.push(DroppedMessage {
                    queue: message.queue,
                    body: message.body,
                });
            }
        }
        if requeue {
            self.inner.ready.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", b"one".to_vec()).await.unwrap();

        let delivery = broker.receive("q").await.unwrap();
        assert_eq!(delivery.body, b"one");
        assert!(!delivery.redelivered);
        assert_eq!(broker.unacked_count(), 1);

        broker.ack(delivery.tag).await.unwrap();
        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(broker.acked_count(), 1);
        assert_eq!(broker.depth("q"), 0);
    }

    #[tokio::test]
    async fn test_nack_requeue_marks_redelivered() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", b"one".to_vec()).await.unwrap();
        broker.publish("q", b"two".to_vec()).await.unwrap();

        let first = broker.receive("q").await.unwrap();
        broker.nack(first.tag, true).await.unwrap();

        let again = broker.receive("q").await.unwrap();
        assert_eq!(again.body, b"one");
        assert!(again.redelivered);
        assert_ne!(again.tag, first.tag);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", b"poison".to_vec()).await.unwrap();

        let delivery = broker.receive("q").await.unwrap();
        broker.nack(delivery.tag, false).await.unwrap();

        assert_eq!(broker.depth("q"), 0);
        assert_eq!(
            broker.dropped(),
            vec![DroppedMessage {
                queue: "q".into(),
                body: b"poison".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn test_double_settle_is_rejected() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", b"x".to_vec()).await.unwrap();
        let delivery = broker.receive("q").await.unwrap();

        broker.ack(delivery.tag).await.unwrap();
        assert_eq!(
            broker.ack(delivery.tag).await,
            Err(BrokerError::UnknownDelivery(delivery.tag))
        );
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.publish("missing", vec![]).await,
            Err(BrokerError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();

        let consumer = broker.clone();
        let handle = tokio::spawn(async move { consumer.receive("q").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.publish("q", b"late".to_vec()).await.unwrap();

        let delivery = handle.await.unwrap().unwrap();
        assert_eq!(delivery.body, b"late");
    }

    #[tokio::test]
    async fn test_disconnect_returns_unacked_and_fails_calls() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        broker.publish("q", b"in-flight".to_vec()).await.unwrap();
        let delivery = broker.receive("q").await.unwrap();

        broker.disconnect();
        assert!(matches!(
            broker.receive("q").await,
            Err(BrokerError::ConnectionLost(_))
        ));
        assert!(matches!(
            broker.publish("q", vec![]).await,
            Err(BrokerError::ConnectionLost(_))
        ));

        broker.reconnect();
        assert_eq!(
            broker.ack(delivery.tag).await,
            Err(BrokerError::UnknownDelivery(delivery.tag))
        );
        let again = broker.receive("q").await.unwrap();
        assert_eq!(again.body, b"in-flight");
        assert!(again.redelivered);
    }
}
