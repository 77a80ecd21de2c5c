use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Booking, Event, EventId, NewEvent, TicketSummary, UserId};

/// Durable, authoritative record of events and confirmed bookings.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<Event>;

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>>;

    async fn list_events(&self) -> Result<Vec<Event>>;

    /// Writes one confirmed booking, all-or-nothing: on `Ok` the row is visible to
    /// subsequent reads, on `Err` nothing was written.
    async fn create_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking>;

    /// Sum of confirmed quantities for the event across all users.
    async fn confirmed_quantity(&self, event_id: EventId) -> Result<u64>;

    /// Sum of confirmed quantities one user holds for the event.
    async fn user_quantity(&self, user_id: UserId, event_id: EventId) -> Result<u64>;

    /// The user's bookings, newest first.
    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<TicketSummary>>;
}
