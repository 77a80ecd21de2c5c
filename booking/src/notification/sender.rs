use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use ledger::{Booking, Event, LedgerStore};
use tracing::info;

use super::ConfirmationSender;

/// Composes the confirmation and writes it to the log. Mail transport is
/// handled outside this service.
pub struct LogConfirmationSender {
    ledger: Arc<dyn LedgerStore>,
}

impl LogConfirmationSender {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }
}

pub fn compose_confirmation(booking: &Booking, event: &Event) -> String {
    let total_cents = event
        .price_cents
        .saturating_mul(i64::from(booking.quantity));
    format!(
        "Booking confirmed: {} ticket(s) for {} (event #{}), total {}.{:02}. Reference {}.",
        booking.quantity,
        event.name,
        event.id,
        total_cents / 100,
        total_cents % 100,
        booking.id
    )
}

#[async_trait]
impl ConfirmationSender for LogConfirmationSender {
    async fn send(&self, booking: &Booking) -> anyhow::Result<()> {
        let event = self
            .ledger
            .fetch_event(booking.event_id)
            .await
            .context("event lookup for confirmation failed")?
            .with_context(|| format!("event {} not found for confirmation", booking.event_id))?;

        let body = compose_confirmation(booking, &event);
        let payload = serde_json::to_string(booking).context("failed to serialize booking")?;

        info!(
            target: "notification",
            user_id = %booking.user_id,
            booking = %payload,
            body = %body,
            "confirmation sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{BookingStatus, EventId, UserId};

    #[test]
    fn message_carries_quantity_event_and_total() {
        let event = Event {
            id: EventId(1),
            name: "Coldplay Mumbai 2026".into(),
            total_tickets: 50_000,
            price_cents: 250_000,
            created_ms: 0,
        };
        let booking = Booking {
            id: uuid::Uuid::nil(),
            user_id: UserId(9),
            event_id: EventId(1),
            quantity: 2,
            status: BookingStatus::Confirmed,
            created_ms: 0,
        };

        let msg = compose_confirmation(&booking, &event);

        assert!(msg.contains("2 ticket(s)"));
        assert!(msg.contains("Coldplay Mumbai 2026"));
        assert!(msg.contains("total 5000.00"));
    }
}
