use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{LockError, LockManager, LockToken};

struct Held {
    owner: Uuid,
    expires_at: Instant,
}

/// In-process lease lock. Serializes tasks of one process only.
///
/// Waiters park on a shared `Notify` and wake on any release, or when the
/// current holder's lease runs out, whichever is first.
#[derive(Default)]
pub struct InMemoryLockManager {
    held: Mutex<HashMap<String, Held>>,
    released: Notify,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently has a live (unexpired) holder.
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .get(key)
            .is_some_and(|h| h.expires_at > Instant::now())
    }

    /// Takes the key if free or expired; otherwise returns when the holder's lease ends.
    fn try_take(&self, key: &str, lease: Duration) -> Result<LockToken, Instant> {
        let mut held = self.held.lock();
        let now = Instant::now();

        if let Some(h) = held.get(key) {
            if h.expires_at > now {
                return Err(h.expires_at);
            }
            warn!(key, owner = %h.owner, "taking over lock with expired lease");
        }

        let token = LockToken::new(key, lease);
        held.insert(
            key.to_string(),
            Held {
                owner: token.owner(),
                expires_at: now + lease,
            },
        );
        Ok(token)
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(
        &self,
        key: &str,
        lease: Duration,
        max_wait: Duration,
    ) -> Result<LockToken, LockError> {
        let started = Instant::now();
        let deadline = started + max_wait;

        loop {
            // Register interest before checking so a release in between is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let holder_expires_at = match self.try_take(key, lease) {
                Ok(token) => {
                    debug!(key, owner = %token.owner(), "lock acquired");
                    return Ok(token);
                }
                Err(expires_at) => expires_at,
            };

            if Instant::now() >= deadline {
                return Err(LockError::Busy {
                    key: key.to_string(),
                    waited: started.elapsed(),
                });
            }

            let wake_at = holder_expires_at.min(deadline);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn release(&self, token: LockToken) -> Result<bool, LockError> {
        let removed = {
            let mut held = self.held.lock();
            match held.get(token.key()) {
                Some(h) if h.owner == token.owner() => {
                    held.remove(token.key());
                    true
                }
                _ => false,
            }
        };

        if removed {
            debug!(key = token.key(), held_ms = token.held_for().as_millis() as u64, "lock released");
            self.released.notify_waiters();
        } else {
            warn!(
                key = token.key(),
                owner = %token.owner(),
                "lock lease lapsed before release; key left to its current holder"
            );
        }

        Ok(removed)
    }
}
