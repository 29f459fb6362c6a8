//! Per-client rate limiting.
//!
//! Each client key (`X-Client-Id` header, else the peer IP, else
//! `anonymous`) gets its own GCRA cell in a keyed `governor` limiter:
//! `burst` requests up front, replenished at `requests_per_second`.
//! Keys whose state is back to full are swept periodically. A rejected
//! request answers `429 Too Many Requests` with a `Retry-After` header.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::ShutdownSignal;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Steady replenish rate.
    pub requests_per_second: u32,
    /// Requests allowed back to back.
    pub burst: u32,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 10,
            burst: 20,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("keys", &self.len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            config,
            limiter: Arc::new(governor::RateLimiter::keyed(quota)),
        }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed;
        }
        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => RateLimitDecision::Allowed,
            Err(not_until) => RateLimitDecision::Limited {
                retry_after: not_until.wait_time_from(DefaultClock::default().now()),
            },
        }
    }

    /// Forgets clients whose allowance has fully replenished. Returns how
    /// many keys were dropped.
    pub fn sweep(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        before.saturating_sub(self.limiter.len())
    }

    pub fn spawn_sweeper(&self, signal: ShutdownSignal) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = signal.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "swept idle rate limit keys");
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}

/// Identifies the caller for rate limiting.
pub fn client_key(req: &Request<Body>) -> String {
    if let Some(id) = req
        .headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return id.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "anonymous".to_string(), |info| info.0.ip().to_string())
}

/// Rate limiting middleware for Axum.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&req);
    match limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(req).await,
        RateLimitDecision::Limited { retry_after } => {
            tracing::warn!(client = %key, path = %req.uri().path(), "rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total").increment(1);
            rate_limit_response(retry_after)
        }
    }
}

fn rate_limit_response(retry_after: Duration) -> Response {
    let body = serde_json::json!({ "error": "rate limit exceeded" });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
    if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests_per_second: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_second,
            burst,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = limiter(1, 3);

        for _ in 0..3 {
            assert_eq!(limiter.check("client"), RateLimitDecision::Allowed);
        }
        match limiter.check("client") {
            RateLimitDecision::Limited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(1));
            }
            other => panic!("expected limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replenishes_over_time() {
        let limiter = limiter(20, 1);
        assert_eq!(limiter.check("client"), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("client"),
            RateLimitDecision::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(limiter.check("client"), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, 1);
        limiter.check("a");
        assert!(matches!(limiter.check("a"), RateLimitDecision::Limited { .. }));
        assert_eq!(limiter.check("b"), RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_sweep_drops_replenished_keys() {
        let limiter = limiter(50, 2);
        limiter.check("old");
        tokio::time::sleep(Duration::from_millis(150)).await;
        limiter.check("fresh");

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_disabled_always_allows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            burst: 1,
            ..RateLimitConfig::default()
        });
        for _ in 0..10 {
            assert_eq!(limiter.check("c"), RateLimitDecision::Allowed);
        }
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_zero_quota_falls_back_to_one() {
        let limiter = limiter(0, 0);
        assert_eq!(limiter.check("c"), RateLimitDecision::Allowed);
        assert!(matches!(limiter.check("c"), RateLimitDecision::Limited { .. }));
    }

    #[test]
    fn test_client_key_precedence() {
        let with_header = Request::builder()
            .header(CLIENT_ID_HEADER, "partner-7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&with_header), "partner-7");

        let mut with_peer = Request::builder().body(Body::empty()).unwrap();
        with_peer
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 4000))));
        assert_eq!(client_key(&with_peer), "10.0.0.9");

        let anonymous = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&anonymous), "anonymous");
    }
}
