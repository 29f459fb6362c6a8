//! Background sweep that drains the outbox into a publisher.

use std::sync::Arc;
use std::time::Duration;

use common::ShutdownSignal;
use tokio::task::JoinHandle;

use crate::outbox::Outbox;
use crate::publisher::Publisher;

/// Configuration for the relay loop.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            enabled: true,
        }
    }
}

impl RelayConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Periodically publishes staged events until shutdown, then runs one last
/// sweep so events staged just before shutdown are not left behind.
pub struct OutboxRelay {
    outbox: Outbox,
    publisher: Arc<dyn Publisher>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(outbox: Outbox, publisher: Arc<dyn Publisher>, config: RelayConfig) -> Self {
        Self {
            outbox,
            publisher,
            config,
        }
    }

    pub async fn run(self, signal: ShutdownSignal) {
        if !self.config.enabled {
            tracing::info!("outbox relay is disabled");
            return;
        }

        tracing::info!(interval = ?self.config.interval, "starting outbox relay");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = signal.cancelled() => {
                    self.outbox.publish(self.publisher.as_ref()).await;
                    tracing::info!("outbox relay shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.outbox.publish(self.publisher.as_ref()).await;
                }
            }
        }
    }

    pub fn spawn(self, signal: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(signal))
    }
}
