use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::config::RateLimitSettings;
use crate::response::json_error;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");

/// Guards `/api/generate`, keyed by client IP.
pub async fn generate_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let limiter = state.rate_limiter();
    let ip = extract_client_ip(&req, limiter.trust_proxy())
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
    let check = limiter.check(ip).await;

    if !check.allowed {
        tracing::debug!(%ip, "generate request rate limited");
        let mut res = json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            "Too many requests, please slow down",
        )
        .into_response();
        apply_rate_limit_headers(&mut res, check);
        return res;
    }

    let mut res = next.run(req).await;
    apply_rate_limit_headers(&mut res, check);
    res
}

fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    if let Ok(value) = HeaderValue::from_str(&check.limit.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.remaining.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    if !check.allowed {
        if let Ok(value) = HeaderValue::from_str(&check.retry_after_seconds.to_string()) {
            res.headers_mut().insert(RETRY_AFTER, value);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
    last_seen_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

/// Token bucket per client: `burst` tokens, one refilled every `refill_interval`.
#[derive(Debug)]
pub struct RateLimiter {
    refill_interval_ms: u64,
    burst: u32,
    idle_ttl_ms: u64,
    trust_proxy: bool,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            refill_interval_ms: duration_ms(settings.refill_interval).max(1),
            burst: settings.burst.max(1),
            idle_ttl_ms: duration_ms(settings.idle_ttl),
            trust_proxy: settings.trust_proxy,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitCheck {
        self.check_at(ip, now_ms()).await
    }

    pub async fn check_at(&self, ip: IpAddr, now_ms: u64) -> RateLimitCheck {
        let capacity = f64::from(self.burst);
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: capacity,
            last_refill_ms: now_ms,
            last_seen_ms: now_ms,
        });

        let elapsed = now_ms.saturating_sub(bucket.last_refill_ms);
        bucket.tokens =
            (bucket.tokens + elapsed as f64 / self.refill_interval_ms as f64).min(capacity);
        bucket.last_refill_ms = now_ms;
        bucket.last_seen_ms = now_ms;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        let missing = (1.0 - bucket.tokens).max(0.0);
        let retry_after_ms = (missing * self.refill_interval_ms as f64).ceil() as u64;

        RateLimitCheck {
            allowed,
            limit: self.burst,
            remaining: bucket.tokens.floor().max(0.0) as u32,
            retry_after_seconds: retry_after_ms.div_ceil(1000),
        }
    }

    /// Drops buckets of clients not seen for longer than the idle TTL.
    pub async fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(now_ms()).await
    }

    pub async fn sweep_idle_at(&self, now_ms: u64) -> usize {
        let ttl = self.idle_ttl_ms;
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| now_ms.saturating_sub(bucket.last_seen_ms) <= ttl);
        before - buckets.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn extract_client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = extract_x_forwarded_for(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn extract_x_forwarded_for(req: &Request<Body>) -> Option<IpAddr> {
    let raw = req
        .headers()
        .get(HeaderName::from_static("x-forwarded-for"))?
        .to_str()
        .ok()?;
    let first = raw.split(',').next()?.trim();
    first.parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(interval_ms: u64, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitSettings {
            refill_interval: Duration::from_millis(interval_ms),
            burst,
            idle_ttl: Duration::from_secs(1800),
            ..RateLimitSettings::default()
        })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn test_burst_then_denied() {
        let limiter = limiter(3000, 1);
        assert!(limiter.check_at(ip(1), 1_000).await.allowed);
        let denied = limiter.check_at(ip(1), 1_500).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_seconds, 3);
    }

    #[tokio::test]
    async fn test_token_refills_after_interval() {
        let limiter = limiter(3000, 1);
        assert!(limiter.check_at(ip(1), 0).await.allowed);
        assert!(!limiter.check_at(ip(1), 2_999).await.allowed);
        assert!(limiter.check_at(ip(1), 6_000).await.allowed);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(3000, 1);
        assert!(limiter.check_at(ip(1), 0).await.allowed);
        assert!(limiter.check_at(ip(2), 0).await.allowed);
    }

    #[tokio::test]
    async fn test_burst_capacity() {
        let limiter = limiter(1000, 3);
        for _ in 0..3 {
            assert!(limiter.check_at(ip(1), 0).await.allowed);
        }
        assert!(!limiter.check_at(ip(1), 0).await.allowed);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_clients() {
        let limiter = limiter(3000, 1);
        limiter.check_at(ip(1), 0).await;
        limiter.check_at(ip(2), 1_700_000).await;

        let removed = limiter.sweep_idle_at(1_800_001).await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_client_ip(&req, true),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(extract_client_ip(&req, false), None);
    }
}
