use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type BookingId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Confirmed => "confirmed",
        };
        f.write_str(s)
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            other => Err(anyhow::anyhow!("Invalid BookingStatus value: {}", other)),
        }
    }
}

/// A sellable occasion. Capacity and price are fixed once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub total_tickets: u64,
    /// Unit price in the smallest currency unit.
    pub price_cents: i64,
    pub created_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub total_tickets: u64,
    pub price_cents: i64,
}

/// One confirmed sale. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub quantity: u32,
    pub status: BookingStatus,
    pub created_ms: u64,
}

/// A booking joined with the event it is for ("my tickets" listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketSummary {
    pub booking: Booking,
    pub event_name: String,
    pub price_cents: i64,
}

impl TicketSummary {
    pub fn total_cents(&self) -> i64 {
        self.price_cents.saturating_mul(i64::from(self.booking.quantity))
    }
}
