//! Request pacing for the bibliographic registry.
//!
//! PubMed allows 10 requests/second with an API key. The client calls
//! [`RateLimiter::before_call`] and [`RateLimiter::after_call`] around every
//! request, so the pacing policy can change without touching lookup logic.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use tracing::debug;
use veritome_common::{Result, VeritomeError};

/// Default pause after each registry call.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Awaited before a request is issued.
    async fn before_call(&self) {}

    /// Awaited after a request finishes, whether it succeeded or not.
    async fn after_call(&self) {}
}

/// Sleeps a fixed delay after every call.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// No pacing at all. Meant for tests and offline sources.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

#[async_trait]
impl RateLimiter for FixedDelay {
    async fn after_call(&self) {
        if !self.delay.is_zero() {
            debug!(delay_ms = self.delay.as_millis() as u64, "rate limiting: sleeping");
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Token-bucket quota. Can be shared behind an `Arc` by several clients.
pub struct TokenBucket {
    limiter: DefaultDirectRateLimiter,
}

impl TokenBucket {
    pub fn per_second(requests_per_second: u32) -> Result<Self> {
        let rps = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            VeritomeError::Config("rate_limit.requests_per_second must be greater than 0".into())
        })?;
        Ok(Self {
            limiter: DefaultDirectRateLimiter::direct(Quota::per_second(rps)),
        })
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn before_call(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fixed_delay_sleeps_after_call() {
        let limiter = FixedDelay::new(Duration::from_millis(20));
        let t0 = Instant::now();
        limiter.before_call().await;
        limiter.after_call().await;
        assert!(t0.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_zero_delay_is_immediate() {
        let limiter = FixedDelay::none();
        let t0 = Instant::now();
        for _ in 0..100 {
            limiter.after_call().await;
        }
        assert!(t0.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_default_delay_matches_registry_quota() {
        assert_eq!(FixedDelay::default().delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_token_bucket_first_call_not_delayed() {
        let bucket = TokenBucket::per_second(10).unwrap();
        let t0 = Instant::now();
        bucket.before_call().await;
        assert!(t0.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_token_bucket_rejects_zero_rate() {
        assert!(matches!(TokenBucket::per_second(0), Err(VeritomeError::Config(_))));
    }
}
