//! Sliding-window rate limiting, fail-open.

use std::sync::Arc;
use std::time::Duration;

use crate::store::kv::KvStore;

#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    pub limit: u64,
    pub window: Duration,
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    limit: RateLimit,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, limit: RateLimit) -> Self {
        Self { store, limit }
    }

    /// Count one event and answer whether it is within the limit. A store
    /// failure always allows: limiting is an aid, never a gate on output.
    pub fn allow(&self, key: &str) -> bool {
        match self
            .store
            .window_incr(&format!("pin:rate:{key}"), self.limit.window)
        {
            Ok(count) => count <= self.limit.limit,
            Err(e) => {
                tracing::warn!(key, error = %e, "rate limiter degraded to allow");
                true
            }
        }
    }
}
