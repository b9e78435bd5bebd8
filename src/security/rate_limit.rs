//! Keyed token-bucket rate limiting.
//!
//! Each limiter class owns a bucket per key. Refill and decrement for a key
//! happen while holding that key's map entry, so two concurrent requests can
//! never both spend the last token. Different keys contend only when they
//! hash to the same `DashMap` shard.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{KeyStrategy, RateLimitConfig};
use crate::security::access_control::IdentityContext;

/// Bucket key for callers without a verified identity.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Capacity and sustained refill rate of a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketParams {
    pub capacity: f64,
    pub rate_per_second: f64,
}

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    params: BucketParams,
}

impl TokenBucket {
    fn full(params: BucketParams, now: Instant) -> Self {
        Self {
            tokens: params.capacity,
            last_refill: now,
            params,
        }
    }

    fn refilled_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.params.rate_per_second).min(self.params.capacity)
    }

    fn try_acquire(&mut self, params: BucketParams, now: Instant) -> bool {
        self.params = params;
        self.tokens = self.refilled_at(now);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Untouched for at least `idle` and refilled to capacity.
    fn is_evictable(&self, idle: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_refill) >= idle && self.refilled_at(now) >= self.params.capacity
    }
}

/// Storage for bucket state.
///
/// The in-memory store is enough for a single gateway process. Several
/// instances sharing limits would implement this over an external store
/// with an atomic script performing the same refill-and-take step.
pub trait BucketStore: Send + Sync + std::fmt::Debug {
    /// Atomically refill the bucket for `key` and take one token.
    fn try_acquire(&self, key: &str, params: BucketParams) -> bool;

    /// Drop buckets untouched for at least `idle` that have refilled to
    /// capacity. Returns how many were removed.
    fn evict_idle(&self, idle: Duration) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    buckets: DashMap<String, TokenBucket>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl BucketStore for InMemoryBucketStore {
    fn try_acquire(&self, key: &str, params: BucketParams) -> bool {
        let now = Instant::now();

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(params, now);
        }

        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(params, now))
            .try_acquire(params, now)
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_evictable(idle, now));
        before.saturating_sub(self.buckets.len())
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { class: String, key: String },
}

#[derive(Debug, Clone, Copy)]
struct LimiterClass {
    params: BucketParams,
    strategy: KeyStrategy,
}

/// Request-facing rate limiter holding every configured class.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    classes: HashMap<String, LimiterClass>,
    store: Arc<dyn BucketStore>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryBucketStore::new()))
    }

    pub fn with_store(config: &RateLimitConfig, store: Arc<dyn BucketStore>) -> Self {
        let classes = config
            .classes
            .iter()
            .map(|(name, class)| {
                let limiter = LimiterClass {
                    params: BucketParams {
                        capacity: f64::from(class.capacity),
                        rate_per_second: class.rate_per_second,
                    },
                    strategy: class.key,
                };
                (name.clone(), limiter)
            })
            .collect();

        Self {
            enabled: config.enabled,
            classes,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    /// Decide whether a request may proceed under `class`.
    pub fn check(
        &self,
        class: &str,
        path: &str,
        identity: Option<&IdentityContext>,
        peer: Option<IpAddr>,
    ) -> Admission {
        if !self.enabled {
            return Admission::Admitted;
        }

        let Some(limiter) = self.classes.get(class) else {
            tracing::warn!(class = %class, "Unknown limiter class, admitting request");
            return Admission::Admitted;
        };

        let key = resolve_key(limiter.strategy, path, identity, peer);
        let bucket_key = format!("{class}:{key}");

        if self.store.try_acquire(&bucket_key, limiter.params) {
            Admission::Admitted
        } else {
            Admission::Rejected {
                class: class.to_string(),
                key,
            }
        }
    }
}

/// Derive the bucket key for a request under the given strategy.
pub fn resolve_key(
    strategy: KeyStrategy,
    path: &str,
    identity: Option<&IdentityContext>,
    peer: Option<IpAddr>,
) -> String {
    match strategy {
        KeyStrategy::Path => path.to_string(),
        KeyStrategy::User => identity
            .map(|id| id.subject.to_string())
            .unwrap_or_else(|| ANONYMOUS_KEY.to_string()),
        KeyStrategy::Ip => peer
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
