use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::CounterStore;

/// Redis-backed counter. `INCRBY`/`DECRBY` are atomic on the server, so the value is
/// shared by every process pointed at the same instance.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn_manager: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .context("failed to create redis connection manager")?;

        Ok(Self::from_manager(conn_manager))
    }

    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

fn to_delta(n: u64) -> Result<i64> {
    i64::try_from(n).with_context(|| format!("counter delta out of range: {n}"))
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        let value: Option<i64> = conn
            .get(key)
            .await
            .with_context(|| format!("redis GET {key} failed"))?;
        Ok(value.unwrap_or(0))
    }

    async fn decrement_by(&self, key: &str, n: u64) -> Result<i64> {
        let delta = to_delta(n)?;
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn
            .decr(key, delta)
            .await
            .with_context(|| format!("redis DECRBY {key} failed"))?;
        Ok(value)
    }

    async fn increment_by(&self, key: &str, n: u64) -> Result<i64> {
        let delta = to_delta(n)?;
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn
            .incr(key, delta)
            .await
            .with_context(|| format!("redis INCRBY {key} failed"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .with_context(|| format!("redis SET {key} failed"))?;
        Ok(())
    }
}
