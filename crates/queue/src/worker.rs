//! Queue worker: one consumer per registered queue.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BackoffPolicy, Retryable, Shutdown, ShutdownSignal};
use tokio::task::JoinHandle;

use crate::broker::{Broker, Delivery};
use crate::error::{BrokerError, HandlerError, WorkerError};
use crate::message::QueueMessage;

/// Handles decoded messages from one queue.
///
/// Delivery is at-least-once: a handler may see the same message more than
/// once and must be safe to repeat.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: QueueMessage) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(QueueMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: QueueMessage) -> Result<(), HandlerError> {
        (self.0)(message).await
    }
}

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Configuration for queue consumers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on a single handler invocation; exceeding it requeues.
    pub handler_timeout: Duration,
    /// Fixed pause before retrying after a broker error.
    pub reconnect_interval: Duration,
    /// Pause before the next receive after a requeue, growing with each
    /// consecutive failure on the queue. `max_attempts` is not used.
    pub requeue_backoff: BackoffPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(5),
            requeue_backoff: BackoffPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_requeue_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.requeue_backoff = policy;
        self
    }
}

struct Running {
    stop: Shutdown,
    consumers: Vec<JoinHandle<()>>,
}

/// Consumes registered queues until stopped.
pub struct QueueWorker {
    broker: Arc<dyn Broker>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    config: WorkerConfig,
    running: Option<Running>,
}

impl QueueWorker {
    pub fn new(broker: Arc<dyn Broker>, config: WorkerConfig) -> Self {
        Self {
            broker,
            handlers: HashMap::new(),
            config,
            running: None,
        }
    }

    /// Registers the handler for `queue`, replacing any previous one.
    /// Takes effect on the next [`QueueWorker::start`].
    pub fn register_handler(&mut self, queue: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(queue.into(), handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns one consumer per registered queue. Consumers exit when either
    /// `signal` fires or [`QueueWorker::stop`] is called.
    pub fn start(&mut self, signal: ShutdownSignal) -> Result<(), WorkerError> {
        if self.running.is_some() {
            return Err(WorkerError::AlreadyRunning);
        }
        if self.handlers.is_empty() {
            return Err(WorkerError::NoHandlers);
        }

        let stop = Shutdown::new();
        let consumers = self
            .handlers
            .iter()
            .map(|(queue, handler)| {
                let consumer = Consumer {
                    queue: queue.clone(),
                    broker: Arc::clone(&self.broker),
                    handler: Arc::clone(handler),
                    config: self.config.clone(),
                };
                tokio::spawn(consumer.run(signal.clone(), stop.signal()))
            })
            .collect();

        tracing::info!(queues = self.handlers.len(), "queue worker started");
        self.running = Some(Running { stop, consumers });
        Ok(())
    }

    /// Cancels every consumer and waits for in-flight handlers to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.trigger();
        for result in futures_util::future::join_all(running.consumers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "queue consumer task failed");
            }
        }
        tracing::info!("queue worker stopped");
    }
}

enum Settlement {
    Acked,
    Requeued,
    Dropped,
}

/// Sleeps for `delay`. Returns `false` if either signal fired first.
async fn pause(delay: Duration, parent: &ShutdownSignal, stop: &ShutdownSignal) -> bool {
    tokio::select! {
        () = parent.cancelled() => false,
        () = stop.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

struct Consumer {
    queue: String,
    broker: Arc<dyn Broker>,
    handler: Arc<dyn MessageHandler>,
    config: WorkerConfig,
}

impl Consumer {
    async fn run(self, parent: ShutdownSignal, stop: ShutdownSignal) {
        tracing::info!(queue = %self.queue, "queue consumer started");
        let mut declared = false;
        let mut failures = 0u32;

        loop {
            if !declared {
                match self.broker.declare_queue(&self.queue).await {
                    Ok(()) => declared = true,
                    Err(e) => {
                        if !self.back_off(&e, &parent, &stop).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let delivery = tokio::select! {
                () = parent.cancelled() => break,
                () = stop.cancelled() => break,
                received = self.broker.receive(&self.queue) => received,
            };

            match delivery {
                // Not raced against shutdown: stop waits for in-flight handlers.
                Ok(delivery) => match self.process(delivery).await {
                    Settlement::Requeued => {
                        failures = failures.saturating_add(1);
                        let delay = self.config.requeue_backoff.delay_for_attempt(failures);
                        tracing::debug!(queue = %self.queue, failures, ?delay, "pausing after requeue");
                        if !pause(delay, &parent, &stop).await {
                            break;
                        }
                    }
                    Settlement::Acked | Settlement::Dropped => failures = 0,
                },
                Err(e) => {
                    declared = false;
                    if !self.back_off(&e, &parent, &stop).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue, "queue consumer stopped");
    }

    /// Sleeps for the reconnect interval. Returns `false` if shutdown fired.
    async fn back_off(&self, error: &BrokerError, parent: &ShutdownSignal, stop: &ShutdownSignal) -> bool {
        tracing::warn!(
            queue = %self.queue,
            error = %error,
            retryable = error.is_retryable(),
            retry_in = ?self.config.reconnect_interval,
            "broker unavailable, retrying"
        );
        pause(self.config.reconnect_interval, parent, stop).await
    }

    #[tracing::instrument(skip(self, delivery), fields(queue = %self.queue, tag = delivery.tag, redelivered = delivery.redelivered))]
    async fn process(&self, delivery: Delivery) -> Settlement {
        let message = match QueueMessage::from_bytes(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "malformed message dropped");
                return self.drop_delivery(delivery.tag).await;
            }
        };

        let message_type = message.message_type.clone();
        let outcome = tokio::time::timeout(self.config.handler_timeout, self.handler.handle(message)).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(message_type = %message_type, "message handled");
                metrics::counter!("queue_messages_acked_total", "queue" => self.queue.clone())
                    .increment(1);
                self.settle(self.broker.ack(delivery.tag).await);
                Settlement::Acked
            }
            Ok(Err(e)) if !e.is_retryable() => {
                tracing::warn!(message_type = %message_type, error = %e, "message rejected by handler, dropping");
                self.drop_delivery(delivery.tag).await
            }
            Ok(Err(e)) => {
                tracing::warn!(message_type = %message_type, error = %e, "handler failed, requeueing");
                self.requeue(delivery.tag).await
            }
            Err(_) => {
                tracing::warn!(
                    message_type = %message_type,
                    timeout = ?self.config.handler_timeout,
                    "handler timed out, requeueing"
                );
                self.requeue(delivery.tag).await
            }
        }
    }

    async fn requeue(&self, tag: u64) -> Settlement {
        metrics::counter!("queue_messages_requeued_total", "queue" => self.queue.clone()).increment(1);
        self.settle(self.broker.nack(tag, true).await);
        Settlement::Requeued
    }

    async fn drop_delivery(&self, tag: u64) -> Settlement {
        metrics::counter!("queue_messages_dropped_total", "queue" => self.queue.clone()).increment(1);
        self.settle(self.broker.nack(tag, false).await);
        Settlement::Dropped
    }

    fn settle(&self, result: Result<(), BrokerError>) {
        // The broker redelivers anything it did not see settled.
        if let Err(e) = result {
            tracing::warn!(queue = %self.queue, error = %e, "failed to settle delivery");
        }
    }
}
