use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::CounterStore;

/// Process-local counter map. Visible only to tasks of the owning process.
#[derive(Default)]
pub struct InMemoryCounterStore {
    values: Mutex<HashMap<String, i64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys ever set or mutated.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

fn to_delta(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| anyhow!("counter delta out of range: {n}"))
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<i64> {
        Ok(self.values.lock().get(key).copied().unwrap_or(0))
    }

    async fn decrement_by(&self, key: &str, n: u64) -> Result<i64> {
        let delta = to_delta(n)?;
        let mut values = self.values.lock();
        let slot = values.entry(key.to_string()).or_insert(0);
        *slot = slot
            .checked_sub(delta)
            .ok_or_else(|| anyhow!("counter underflow on {key}"))?;
        debug!(key, delta, value = *slot, "counter decremented");
        Ok(*slot)
    }

    async fn increment_by(&self, key: &str, n: u64) -> Result<i64> {
        let delta = to_delta(n)?;
        let mut values = self.values.lock();
        let slot = values.entry(key.to_string()).or_insert(0);
        *slot = slot
            .checked_add(delta)
            .ok_or_else(|| anyhow!("counter overflow on {key}"))?;
        debug!(key, delta, value = *slot, "counter incremented");
        Ok(*slot)
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        debug!(key, value, "counter set");
        Ok(())
    }
}
