use async_trait::async_trait;
use eyre::{Result, WrapErr};
use redis::{RedisError, Script, aio::ConnectionManager};

use crate::ports::counter_store::{
    AtomicScript, CounterStore, CounterStoreError, CounterStoreResult,
};

/// Counter store backed by Redis server-side Lua scripts.
///
/// Scripts are sent with `EVALSHA` and transparently re-loaded when the
/// server does not know them yet.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    token_bucket: Script,
}

impl RedisCounterStore {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .wrap_err_with(|| format!("Invalid Redis URL: {url}"))?;
        let conn = ConnectionManager::new(client)
            .await
            .wrap_err_with(|| format!("Failed to connect to Redis at {url}"))?;
        tracing::info!("Connected rate limiter counter store to {}", url);
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            token_bucket: Script::new(AtomicScript::TokenBucket.lua()),
        }
    }

    fn script(&self, script: AtomicScript) -> &Script {
        match script {
            AtomicScript::TokenBucket => &self.token_bucket,
        }
    }
}

fn map_error(e: RedisError) -> CounterStoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CounterStoreError::Connection(e.to_string())
    } else if e.kind() == redis::ErrorKind::TypeError {
        CounterStoreError::Corrupt(e.to_string())
    } else {
        CounterStoreError::Script(e.to_string())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn eval_atomic(
        &self,
        script: AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> CounterStoreResult<Vec<i64>> {
        let mut invocation = self.script(script).prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(*arg);
        }
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = invocation.invoke_async(&mut conn).await.map_err(map_error)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limiter::bucket_keys;

    // Requires a running Redis instance:
    // docker run -d -p 6379:6379 redis:7
    #[tokio::test]
    #[ignore]
    async fn test_token_bucket_script() {
        let store = RedisCounterStore::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let keys = bucket_keys(&format!("test-{}", uuid::Uuid::new_v4()));

        let first = store
            .eval_atomic(AtomicScript::TokenBucket, &keys, &[1, 10, 0, 1])
            .await
            .unwrap();
        assert_eq!(first, vec![1, 9]);

        let second = store
            .eval_atomic(AtomicScript::TokenBucket, &keys, &[1, 10, 0, 10])
            .await
            .unwrap();
        assert_eq!(second, vec![0, 9]);
    }
}
