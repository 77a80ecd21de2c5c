use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{LockError, LockManager, LockToken};

/// Deletes the key only if it still carries our owner marker.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Cross-process lease lock on a single Redis instance.
///
/// Acquisition is `SET key owner NX PX lease`, retried every `poll_interval`
/// until `max_wait` elapses. Expiry is enforced by Redis, so a crashed holder
/// frees the key after its lease.
#[derive(Clone)]
pub struct RedisLockManager {
    conn_manager: ConnectionManager,
    poll_interval: Duration,
}

impl RedisLockManager {
    pub async fn connect(redis_url: &str, poll_interval: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .context("failed to create redis connection manager")?;

        Ok(Self::from_manager(conn_manager, poll_interval))
    }

    pub fn from_manager(conn_manager: ConnectionManager, poll_interval: Duration) -> Self {
        Self {
            conn_manager,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    async fn try_set(&self, token: &LockToken) -> Result<bool, LockError> {
        let mut conn = self.conn_manager.clone();
        let lease_ms = token.lease().as_millis().max(1) as u64;

        let reply: Option<String> = redis::cmd("SET")
            .arg(token.key())
            .arg(token.owner().to_string())
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("redis SET NX {} failed", token.key()))?;

        Ok(reply.is_some())
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(
        &self,
        key: &str,
        lease: Duration,
        max_wait: Duration,
    ) -> Result<LockToken, LockError> {
        let started = Instant::now();
        let deadline = started + max_wait;
        let token = LockToken::new(key, lease);

        loop {
            if self.try_set(&token).await? {
                debug!(key, owner = %token.owner(), "lock acquired");
                return Ok(token);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Busy {
                    key: key.to_string(),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep_until((now + self.poll_interval).min(deadline)).await;
        }
    }

    async fn release(&self, token: LockToken) -> Result<bool, LockError> {
        let mut conn = self.conn_manager.clone();

        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(token.key())
            .arg(token.owner().to_string())
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("redis release of {} failed", token.key()))?;

        if deleted == 1 {
            debug!(key = token.key(), held_ms = token.held_for().as_millis() as u64, "lock released");
            Ok(true)
        } else {
            warn!(
                key = token.key(),
                owner = %token.owner(),
                "lock lease lapsed before release; key left to its current holder"
            );
            Ok(false)
        }
    }
}
