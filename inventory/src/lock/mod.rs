pub mod memory;
pub mod redis_lock;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

pub use memory::InMemoryLockManager;
pub use redis_lock::RedisLockManager;

#[derive(Error, Debug)]
pub enum LockError {
    /// Another holder kept the key for the whole wait window.
    #[error("lock `{key}` still held after waiting {waited:?}")]
    Busy { key: String, waited: Duration },

    #[error("lock backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Proof of holding one key's lock until `release` or lease expiry.
#[derive(Debug)]
pub struct LockToken {
    key: String,
    owner: Uuid,
    lease: Duration,
    acquired_at: Instant,
}

impl LockToken {
    pub(crate) fn new(key: &str, lease: Duration) -> Self {
        Self {
            key: key.to_string(),
            owner: Uuid::new_v4(),
            lease,
            acquired_at: Instant::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Opaque owner marker stored alongside the key.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// True once the lease may have lapsed and another holder may own the key.
    pub fn lease_expired(&self) -> bool {
        self.held_for() >= self.lease
    }
}

/// Per-key mutual exclusion with a lease and a bounded wait.
///
/// Guarantees:
/// - at most one live holder per key
/// - distinct keys never contend
/// - a crashed holder blocks others for at most `lease`
///
/// Waiter order is best-effort; the first waiter to observe a free key wins.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(
        &self,
        key: &str,
        lease: Duration,
        max_wait: Duration,
    ) -> Result<LockToken, LockError>;

    /// Releases the key if `token` still owns it.
    ///
    /// Returns `false` when the lease had already lapsed and the key was left alone.
    async fn release(&self, token: LockToken) -> Result<bool, LockError>;
}
