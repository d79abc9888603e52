//! Distributed token bucket backed by a shared [`CounterStore`].
//!
//! Bucket state lives in the store under two keys per bucket (remaining
//! tokens and last refill timestamp). The only writer of those keys is the
//! [`AtomicScript::TokenBucket`] operation, which reads, refills, consumes and
//! persists both keys in one indivisible step.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    core::error::{GatewayError, GatewayResult},
    ports::counter_store::{AtomicScript, CounterStore, CounterStoreError},
};

/// What to do when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through and report unknown remaining tokens.
    #[default]
    FailOpen,
    /// Fail the request with the store error.
    FailClosed,
}

/// Bucket parameters for one limited route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    /// Tokens added per second.
    pub replenish_rate: u32,
    /// Maximum tokens the bucket holds.
    pub burst_capacity: u32,
    /// Tokens each request consumes.
    pub requested_tokens: u32,
}

impl BucketLimits {
    pub fn new(replenish_rate: u32, burst_capacity: u32) -> Self {
        Self {
            replenish_rate,
            burst_capacity,
            requested_tokens: 1,
        }
    }

    pub fn with_requested_tokens(mut self, requested_tokens: u32) -> Self {
        self.requested_tokens = requested_tokens;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.replenish_rate == 0 {
            return Err("replenish_rate must be greater than 0".to_string());
        }
        if self.burst_capacity == 0 {
            return Err("burst_capacity must be greater than 0".to_string());
        }
        if self.requested_tokens == 0 {
            return Err("requested_tokens must be greater than 0".to_string());
        }
        if bucket_ttl(self.replenish_rate.into(), self.burst_capacity.into()) < 1 {
            return Err(format!(
                "burst_capacity {} is too small for replenish_rate {}: idle buckets would never be stored",
                self.burst_capacity, self.replenish_rate
            ));
        }
        Ok(())
    }
}

/// Time-to-live of both bucket keys, in seconds.
pub fn bucket_ttl(replenish_rate: i64, burst_capacity: i64) -> i64 {
    if replenish_rate <= 0 {
        return 0;
    }
    (2 * burst_capacity) / replenish_rate
}

/// Store keys for bucket `id`: `[tokens, timestamp]`.
///
/// The id is wrapped in braces so clustered stores keep both keys in one slot.
pub fn bucket_keys(id: &str) -> [String; 2] {
    let prefix = format!("request_rate_limiter.{{{id}}}");
    [format!("{prefix}.tokens"), format!("{prefix}.timestamp")]
}

/// One refill-and-consume step of the token bucket.
///
/// Returns `(allowed, new_tokens)`. Absent state means a full bucket last
/// refreshed at time 0. A rejected request consumes nothing.
pub fn token_bucket_step(
    last_tokens: Option<i64>,
    last_refreshed: Option<i64>,
    replenish_rate: i64,
    burst_capacity: i64,
    now: i64,
    requested: i64,
) -> (bool, i64) {
    let last_tokens = last_tokens.unwrap_or(burst_capacity);
    let last_refreshed = last_refreshed.unwrap_or(0);
    let delta = (now - last_refreshed).max(0);
    let filled = burst_capacity.min(last_tokens.saturating_add(delta.saturating_mul(replenish_rate)));
    if filled >= requested {
        (true, filled - requested)
    } else {
        (false, filled)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Tokens left in the bucket, `-1` when the store could not be consulted.
    pub tokens_remaining: i64,
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Token bucket limiter shared by every rate limiting filter instance.
pub struct DistributedRateLimiter {
    store: Arc<dyn CounterStore>,
    failure_policy: FailurePolicy,
    complete_on_cancel: bool,
    clock: fn() -> i64,
}

impl DistributedRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            failure_policy: FailurePolicy::default(),
            complete_on_cancel: false,
            clock: unix_now,
        }
    }

    /// Replace the seconds-since-epoch clock used by [`check`](Self::check).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// When set, a store update already started keeps running after the
    /// request is cancelled; otherwise it is abandoned.
    pub fn with_complete_on_cancel(mut self, complete: bool) -> Self {
        self.complete_on_cancel = complete;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Check bucket `id` at the current time.
    pub async fn check(
        &self,
        id: &str,
        limits: &BucketLimits,
        cancellation: &CancellationToken,
    ) -> GatewayResult<RateLimitDecision> {
        let now = (self.clock)();
        self.is_allowed(id, limits, now, cancellation).await
    }

    /// Check bucket `id` at `now` (seconds since the epoch).
    pub async fn is_allowed(
        &self,
        id: &str,
        limits: &BucketLimits,
        now: i64,
        cancellation: &CancellationToken,
    ) -> GatewayResult<RateLimitDecision> {
        limits
            .validate()
            .map_err(|message| GatewayError::InvalidRateLimit {
                bucket: id.to_string(),
                message,
            })?;
        let keys = bucket_keys(id);
        let args = [
            i64::from(limits.replenish_rate),
            i64::from(limits.burst_capacity),
            now,
            i64::from(limits.requested_tokens),
        ];
        let store = self.store.clone();
        let call = async move {
            store
                .eval_atomic(AtomicScript::TokenBucket, &keys, &args)
                .await
        };

        let reply = if self.complete_on_cancel {
            let handle = tokio::spawn(call);
            tokio::select! {
                joined = handle => joined
                    .map_err(|e| CounterStoreError::Script(e.to_string()))
                    .and_then(|reply| reply),
                _ = cancellation.cancelled() => {
                    tracing::debug!(bucket = id, "request cancelled, bucket update continues in background");
                    return Err(GatewayError::Cancelled);
                }
            }
        } else {
            tokio::select! {
                reply = call => reply,
                _ = cancellation.cancelled() => {
                    tracing::debug!(bucket = id, "request cancelled, bucket update abandoned");
                    return Err(GatewayError::Cancelled);
                }
            }
        };

        match reply.and_then(parse_reply) {
            Ok(decision) => Ok(decision),
            Err(e) => match self.failure_policy {
                FailurePolicy::FailOpen => {
                    tracing::warn!(bucket = id, error = %e, "rate limiter store failed, allowing request");
                    Ok(RateLimitDecision {
                        allowed: true,
                        tokens_remaining: -1,
                    })
                }
                FailurePolicy::FailClosed => {
                    tracing::error!(bucket = id, error = %e, "rate limiter store failed, rejecting request");
                    Err(GatewayError::RateLimiterStore(e))
                }
            },
        }
    }
}

fn parse_reply(reply: Vec<i64>) -> Result<RateLimitDecision, CounterStoreError> {
    match reply.as_slice() {
        [allowed, tokens] => Ok(RateLimitDecision {
            allowed: *allowed == 1,
            tokens_remaining: *tokens,
        }),
        other => Err(CounterStoreError::Corrupt(format!(
            "expected [allowed, tokens], got {other:?}"
        ))),
    }
}
