//! Process-wide token-bucket rate limiters, keyed by `(provider, resource)`
//! (§5: "Token buckets are process-wide, keyed by `(provider, resource)`
//! (e.g. `openai/chat`, `openai/embed`). Each bucket is protected by its own
//! lock; acquisitions are FIFO.").

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::sync::Mutex;
use tracing::debug;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One bucket for one `(provider, resource)` pair. The `queue` mutex
/// serializes waiters into arrival order so acquisitions are FIFO rather
/// than a thundering-herd race against `governor`'s lock-free `check()`.
pub struct RateLimiter {
    inner: DirectLimiter,
    queue: Mutex<()>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).unwrap();
        let burst = NonZeroU32::new(burst.max(1)).unwrap();
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            inner: GovernorLimiter::direct(quota),
            queue: Mutex::new(()),
            clock: DefaultClock::default(),
        }
    }

    /// Blocks (asynchronously) until a token is available. FIFO within this
    /// limiter because only one waiter at a time holds `queue`.
    pub async fn acquire(&self) {
        let _guard = self.queue.lock().await;
        loop {
            match self.inner.check() {
                Ok(()) => return,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// A single process-wide registry of rate limiters. `Runtime` (in
/// `cognify-storage`) owns one of these and hands out `Arc<RateLimiter>`
/// handles to the extractor, validator, embedder and writer.
#[derive(Clone)]
pub struct RateLimiterRegistry {
    limiters: Arc<DashMap<(String, String), Arc<RateLimiter>>>,
    default_rps: u32,
    default_burst: u32,
}

impl RateLimiterRegistry {
    pub fn new(default_rps: u32, default_burst: u32) -> Self {
        Self {
            limiters: Arc::new(DashMap::new()),
            default_rps,
            default_burst,
        }
    }

    /// Look up (creating on first use) the bucket for `(provider, resource)`,
    /// e.g. `("openai", "chat")` or `("openai", "embed")`.
    pub fn get(&self, provider: &str, resource: &str) -> Arc<RateLimiter> {
        let key = (provider.to_string(), resource.to_string());
        self.limiters
            .entry(key)
            .or_insert_with(|| Arc::new(RateLimiter::new(self.default_rps, self.default_burst)))
            .clone()
    }

    /// Install an explicit bucket for a `(provider, resource)` pair,
    /// overriding the default quota.
    pub fn configure(&self, provider: &str, resource: &str, rps: u32, burst: u32) {
        let key = (provider.to_string(), resource.to_string());
        self.limiters
            .insert(key, Arc::new(RateLimiter::new(rps, burst)));
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(5, 10)
    }
}
