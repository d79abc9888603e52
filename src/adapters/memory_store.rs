use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    core::rate_limiter::{bucket_ttl, token_bucket_step},
    ports::counter_store::{AtomicScript, CounterStore, CounterStoreError, CounterStoreResult},
};

/// Expired entries are dropped from the whole map at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: i64,
    expires_at: Instant,
}

struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Entries {
    fn live(&self, key: &str, now: Instant) -> Option<i64> {
        self.map
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value)
    }

    fn sweep_if_due(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.map.retain(|_, e| e.expires_at > now);
            self.last_sweep = now;
        }
    }
}

/// Process-local counter store.
///
/// Scripts run natively while holding a single lock, which gives the same
/// all-or-nothing behaviour as a server-side script. State is not shared
/// between gateway instances; use it for single-node deployments and tests.
pub struct InMemoryCounterStore {
    entries: Mutex<Entries>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, ignoring expired entries.
    pub async fn get(&self, key: &str) -> Option<i64> {
        self.entries.lock().await.live(key, Instant::now())
    }

    /// Number of entries held, expired ones included until the next sweep.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn arg(args: &[i64], index: usize, name: &str) -> CounterStoreResult<i64> {
    args.get(index)
        .copied()
        .ok_or_else(|| CounterStoreError::Script(format!("missing argument '{name}'")))
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn eval_atomic(
        &self,
        script: AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> CounterStoreResult<Vec<i64>> {
        match script {
            AtomicScript::TokenBucket => {
                let [tokens_key, timestamp_key] = keys else {
                    return Err(CounterStoreError::Script(format!(
                        "token bucket expects 2 keys, got {}",
                        keys.len()
                    )));
                };
                let rate = arg(args, 0, "replenish_rate")?;
                let capacity = arg(args, 1, "burst_capacity")?;
                let now = arg(args, 2, "now")?;
                let requested = arg(args, 3, "requested")?;

                if rate <= 0 || capacity <= 0 {
                    return Err(CounterStoreError::Script(format!(
                        "replenish_rate and burst_capacity must be positive, got {rate} and {capacity}"
                    )));
                }

                let mut entries = self.entries.lock().await;
                let clock = Instant::now();
                entries.sweep_if_due(clock);

                let last_tokens = entries.live(tokens_key, clock);
                let last_refreshed = entries.live(timestamp_key, clock);
                let (allowed, new_tokens) =
                    token_bucket_step(last_tokens, last_refreshed, rate, capacity, now, requested);

                let ttl = bucket_ttl(rate, capacity).max(1);
                let expires_at = clock + Duration::from_secs(ttl.unsigned_abs());
                entries.map.insert(
                    tokens_key.clone(),
                    Entry {
                        value: new_tokens,
                        expires_at,
                    },
                );
                entries.map.insert(
                    timestamp_key.clone(),
                    Entry {
                        value: now,
                        expires_at,
                    },
                );

                Ok(vec![i64::from(allowed), new_tokens])
            }
        }
    }
}
