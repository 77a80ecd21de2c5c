use std::time::Duration;

use ledger::EventId;
use tracing::debug;

/// Stand-in for a checkout gateway: a fixed pause inside the critical section.
///
/// Its duration is what the lock lease is sized against.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedPayment {
    delay: Duration,
}

impl SimulatedPayment {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn charge(&self, event_id: EventId, quantity: u32) {
        if self.delay.is_zero() {
            return;
        }
        debug!(%event_id, quantity, delay_ms = self.delay.as_millis() as u64, "simulating payment");
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn charge_waits_for_the_configured_delay() {
        let payment = SimulatedPayment::new(Duration::from_secs(30));
        let start = tokio::time::Instant::now();

        payment.charge(EventId(1), 2).await;

        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_returns_immediately() {
        let payment = SimulatedPayment::default();
        let start = tokio::time::Instant::now();

        payment.charge(EventId(1), 2).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
