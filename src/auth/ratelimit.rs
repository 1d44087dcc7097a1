//! Rate limiter for authentication attempts
//!
//! Fixed-window counters kept in the cache. Each attempt is counted with one
//! atomic increment, so several service instances sharing a cache enforce one
//! limit between them.
//!
//! Counter key: `ratelimit:{scope}:{key}:{window_start}` where
//! `window_start = floor(now / window) * window` in unix seconds. The key expires
//! at the end of its window, so a counter never decreases inside a window and
//! starts over exactly at the boundary.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::clock::SharedClock;
use crate::error::AuthError;
use crate::plugins::cache::CachePlugin;

use super::timeout::with_timeout;

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length
    pub window: Duration,

    /// Attempts allowed per identity within a window
    pub max_attempts_per_identity: u64,

    /// Attempts allowed per source address within a window
    pub max_attempts_per_source: u64,

    /// Deadline for each cache call
    pub call_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_attempts_per_identity: 5,
            max_attempts_per_source: 20,
            call_timeout: Duration::from_millis(500),
        }
    }
}

/// What a counter is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// The identity being authenticated
    Identity,
    /// The network source of the request
    Source,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::Identity => write!(f, "identity"),
            RateLimitScope::Source => write!(f, "source"),
        }
    }
}

/// Outcome of counting one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Attempts in the current window, including this one
    pub count: u64,

    /// Attempts allowed in the window
    pub limit: u64,

    /// Time until the window ends
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// Whether the attempt is within the limit
    pub fn allowed(&self) -> bool {
        self.count <= self.limit
    }
}

/// Rate limiter for authentication attempts
pub struct RateLimiter {
    config: RateLimitConfig,
    cache: Arc<dyn CachePlugin>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig, cache: Arc<dyn CachePlugin>, clock: SharedClock) -> Self {
        Self {
            config,
            cache,
            clock,
        }
    }

    /// Rate limiter configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Maximum attempts for a scope
    pub fn limit(&self, scope: RateLimitScope) -> u64 {
        match scope {
            RateLimitScope::Identity => self.config.max_attempts_per_identity,
            RateLimitScope::Source => self.config.max_attempts_per_source,
        }
    }

    /// Time until the current window closes
    pub fn retry_after(&self) -> Duration {
        self.window().1
    }

    /// Current window start and time remaining in it
    fn window(&self) -> (i64, Duration) {
        let window_secs = self.config.window.as_secs().max(1) as i64;
        let now = self.clock.now().timestamp();
        let start = now.div_euclid(window_secs) * window_secs;
        let remaining = (start + window_secs - now).max(1) as u64;
        (start, Duration::from_secs(remaining))
    }

    fn counter_key(scope: RateLimitScope, key: &str, window_start: i64) -> String {
        format!("ratelimit:{}:{}:{}", scope, key, window_start)
    }

    /// Count one attempt and decide whether it is allowed
    ///
    /// Increment and check happen in a single cache operation, so concurrent
    /// attempts on the same key each see a distinct count.
    pub async fn hit(
        &self,
        scope: RateLimitScope,
        key: &str,
    ) -> Result<RateLimitDecision, AuthError> {
        let (window_start, remaining) = self.window();
        let count = with_timeout(
            self.config.call_timeout,
            "cache.increment",
            self.cache
                .increment_with_ttl(&Self::counter_key(scope, key, window_start), remaining),
        )
        .await?;

        let decision = RateLimitDecision {
            count,
            limit: self.limit(scope),
            retry_after: remaining,
        };

        if !decision.allowed() {
            debug!(
                scope = %scope,
                key = key,
                count = count,
                limit = decision.limit,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Record an attempt and return the count in the current window
    pub async fn record_attempt(
        &self,
        scope: RateLimitScope,
        key: &str,
    ) -> Result<u64, AuthError> {
        self.hit(scope, key).await.map(|decision| decision.count)
    }

    /// Whether another attempt would currently be allowed
    ///
    /// Read-only; use [`RateLimiter::hit`] to count and check atomically.
    pub async fn check(&self, scope: RateLimitScope, key: &str) -> Result<bool, AuthError> {
        Ok(self.attempts(scope, key).await? < self.limit(scope))
    }

    /// Attempts recorded in the current window
    pub async fn attempts(&self, scope: RateLimitScope, key: &str) -> Result<u64, AuthError> {
        let (window_start, _) = self.window();
        let value = with_timeout(
            self.config.call_timeout,
            "cache.get_counter",
            self.cache.get(&Self::counter_key(scope, key, window_start)),
        )
        .await?;

        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Clear the counter for the current window
    pub async fn reset(&self, scope: RateLimitScope, key: &str) -> Result<(), AuthError> {
        let (window_start, _) = self.window();
        with_timeout(
            self.config.call_timeout,
            "cache.delete_counter",
            self.cache.delete(&Self::counter_key(scope, key, window_start)),
        )
        .await
    }
}
