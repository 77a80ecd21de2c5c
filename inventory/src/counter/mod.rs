pub mod memory;
pub mod redis_store;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::InMemoryCounterStore;
pub use redis_store::RedisCounterStore;

/// Low-latency counter keyed by event.
///
/// Each mutation is atomic at the storage layer. The store enforces no bounds:
/// callers serialize check-then-decrement through the event lock and must never
/// decrement past zero themselves.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value; a key that was never set reads as 0.
    async fn get(&self, key: &str) -> Result<i64>;

    /// Atomically subtracts `n` and returns the new value.
    async fn decrement_by(&self, key: &str, n: u64) -> Result<i64>;

    /// Atomically adds `n` and returns the new value.
    async fn increment_by(&self, key: &str, n: u64) -> Result<i64>;

    /// Overwrites the value. Only used for initialization and reconciliation.
    async fn set(&self, key: &str, value: i64) -> Result<()>;
}
