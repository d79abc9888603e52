use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a shared counter store.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum CounterStoreError {
    /// The store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected or failed to run the operation.
    #[error("script error: {0}")]
    Script(String),

    /// The operation returned data of an unexpected shape.
    #[error("corrupt reply: {0}")]
    Corrupt(String),
}

pub type CounterStoreResult<T> = Result<T, CounterStoreError>;

/// Atomic operations a counter store must be able to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AtomicScript {
    /// Token bucket check-and-update.
    ///
    /// Keys: `[tokens_key, timestamp_key]`.
    /// Args: `[replenish_rate, burst_capacity, now_secs, requested]`.
    /// Reply: `[allowed (0|1), new_tokens]`.
    TokenBucket,
}

impl AtomicScript {
    /// Lua source for stores with server-side scripting.
    pub fn lua(&self) -> &'static str {
        match self {
            AtomicScript::TokenBucket => TOKEN_BUCKET_LUA,
        }
    }
}

const TOKEN_BUCKET_LUA: &str = r#"
local tokens_key = KEYS[1]
local timestamp_key = KEYS[2]

local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])

if rate == nil or rate <= 0 or capacity == nil or capacity <= 0 then
  return redis.error_reply("replenish_rate and burst_capacity must be positive")
end

local ttl = math.max(1, math.floor(2 * capacity / rate))

local last_tokens = tonumber(redis.call("get", tokens_key))
if last_tokens == nil then
  last_tokens = capacity
end

local last_refreshed = tonumber(redis.call("get", timestamp_key))
if last_refreshed == nil then
  last_refreshed = 0
end

local delta = math.max(0, now - last_refreshed)
local filled_tokens = math.min(capacity, last_tokens + (delta * rate))
local allowed = filled_tokens >= requested
local new_tokens = filled_tokens
local allowed_num = 0
if allowed then
  new_tokens = filled_tokens - requested
  allowed_num = 1
end

redis.call("setex", tokens_key, ttl, new_tokens)
redis.call("setex", timestamp_key, ttl, now)

return { allowed_num, new_tokens }
"#;

/// Port for a key/value store shared by every gateway instance.
///
/// The only way callers mutate store state is through [`AtomicScript`]s, each
/// of which the implementation must run as one indivisible operation.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    async fn eval_atomic(
        &self,
        script: AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> CounterStoreResult<Vec<i64>>;
}
