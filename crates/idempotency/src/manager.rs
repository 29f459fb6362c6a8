//! Keyed result cache with per-key execution locks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use common::{Retryable, ShutdownSignal};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cache settings.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Entries older than this are evicted by the sweep regardless of the
    /// TTL they were looked up with.
    pub horizon: Duration,

    /// How often the background sweep runs.
    pub sweep_interval: Duration,

    /// Upper bound on how long a retryable error is replayed to duplicates.
    pub transient_error_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            transient_error_ttl: Duration::from_secs(5),
        }
    }
}

impl IdempotencyConfig {
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

struct CachedOutcome<T, E> {
    outcome: Result<T, E>,
    stored_at: Instant,
}

struct Inner<T, E> {
    entries: Mutex<HashMap<String, CachedOutcome<T, E>>>,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: IdempotencyConfig,
}

/// Executes an operation at most once per key within a TTL.
///
/// Both successes and errors are cached. Errors whose
/// [`Retryable::is_retryable`] is true are replayed for at most
/// [`IdempotencyConfig::transient_error_ttl`], so a supplier 503 is not
/// remembered for a full day while a double-submit a second later still gets
/// the original answer.
///
/// Concurrent calls with the same key are collapsed onto one execution;
/// calls with different keys never wait on each other.
pub struct IdempotencyManager<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for IdempotencyManager<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> IdempotencyManager<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Retryable + Send + 'static,
{
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                key_locks: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Returns the cached outcome for `key` if it is younger than `ttl`,
    /// otherwise runs `f` and caches its outcome.
    pub async fn execute<F, Fut>(&self, key: &str, ttl: Duration, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(outcome) = self.lookup(key, ttl) {
            metrics::counter!("idempotency_hits_total").increment(1);
            tracing::debug!(key, "idempotency hit");
            return outcome;
        }

        let key_lock = self.key_lock(key);
        let _guard = key_lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(outcome) = self.lookup(key, ttl) {
            metrics::counter!("idempotency_hits_total").increment(1);
            tracing::debug!(key, "idempotency hit after wait");
            return outcome;
        }

        metrics::counter!("idempotency_misses_total").increment(1);
        let outcome = f().await;
        self.store(key, outcome.clone());
        self.key_locks().remove(key);
        outcome
    }

    /// Drops the cached outcome for `key`. Returns true if one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Evicts entries older than the configured horizon.
    pub fn evict_expired(&self) -> usize {
        let horizon = self.inner.config.horizon;
        let evicted = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|_, cached| cached.stored_at.elapsed() < horizon);
            before - entries.len()
        };
        self.key_locks()
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if evicted > 0 {
            tracing::debug!(evicted, "idempotency entries evicted");
        }
        evicted
    }

    /// Spawns the periodic eviction sweep. The task exits when `signal` fires.
    pub fn spawn_sweeper(&self, signal: ShutdownSignal) -> JoinHandle<()> {
        let manager = self.clone();
        let interval = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = signal.cancelled() => {
                        tracing::info!("idempotency sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.evict_expired();
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn lookup(&self, key: &str, ttl: Duration) -> Option<Result<T, E>> {
        let entries = self.entries();
        let cached = entries.get(key)?;
        let effective_ttl = match &cached.outcome {
            Err(e) if e.is_retryable() => ttl.min(self.inner.config.transient_error_ttl),
            _ => ttl,
        };
        (cached.stored_at.elapsed() < effective_ttl).then(|| cached.outcome.clone())
    }

    fn store(&self, key: &str, outcome: Result<T, E>) {
        self.entries().insert(
            key.to_string(),
            CachedOutcome {
                outcome,
                stored_at: Instant::now(),
            },
        );
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.key_locks().entry(key.to_string()).or_default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedOutcome<T, E>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key_locks(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inner
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T, E> Default for IdempotencyManager<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Retryable + Send + 'static,
{
    fn default() -> Self {
        Self::new(IdempotencyConfig::default())
    }
}
