use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use common::time::now_ms;
use sqlx::{AnyPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{
    Booking, BookingStatus, Event, EventId, NewEvent, TicketSummary, UserId,
};
use crate::repository::LedgerStore;

/// SQLx-backed implementation of LedgerStore.
/// Responsible only for persistence and row mapping.
pub struct SqlxLedgerStore {
    pool: AnyPool,
}

impl SqlxLedgerStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for SqlxLedgerStore {
    async fn create_event(&self, event: NewEvent) -> anyhow::Result<Event> {
        if event.name.trim().is_empty() {
            bail!("event name must not be empty");
        }
        if event.price_cents < 0 {
            bail!("event price must not be negative: {}", event.price_cents);
        }

        let total_i64 = u64_to_i64(event.total_tickets)?;
        let created_ms = now_ms();

        let row = sqlx::query(
            r#"
INSERT INTO events (name, total_tickets, price_cents, created_ms)
VALUES (?, ?, ?, ?)
RETURNING event_id;
"#,
        )
        .bind(event.name.clone())
        .bind(total_i64)
        .bind(event.price_cents)
        .bind(u64_to_i64(created_ms)?)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert event")?;

        let id = EventId(row.get::<i64, _>("event_id"));
        debug!(event_id = %id, total_tickets = event.total_tickets, "event created");

        Ok(Event {
            id,
            name: event.name,
            total_tickets: event.total_tickets,
            price_cents: event.price_cents,
            created_ms,
        })
    }

    async fn fetch_event(&self, event_id: EventId) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query(
            r#"
SELECT event_id, name, total_tickets, price_cents, created_ms
FROM events
WHERE event_id = ?;
"#,
        )
        .bind(event_id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to fetch event {event_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_event(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
SELECT event_id, name, total_tickets, price_cents, created_ms
FROM events
ORDER BY event_id;
"#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list events")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_event(&r) {
                Ok(e) => out.push(e),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the listing
                    warn!(error = %e, "skipping malformed event row");
                }
            }
        }

        Ok(out)
    }

    async fn create_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> anyhow::Result<Booking> {
        if quantity == 0 {
            bail!("booking quantity must be positive");
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            quantity,
            status: BookingStatus::Confirmed,
            created_ms: now_ms(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open ledger transaction")?;

        // Single write statement; the event check and the insert cannot interleave.
        let inserted = sqlx::query(
            r#"
INSERT INTO bookings (booking_id, user_id, event_id, quantity, status, created_ms)
SELECT ?, ?, ?, ?, ?, ?
WHERE EXISTS (SELECT 1 FROM events WHERE event_id = ?);
"#,
        )
        .bind(booking.id.to_string())
        .bind(user_id.0)
        .bind(event_id.0)
        .bind(i64::from(quantity))
        .bind(booking.status.to_string())
        .bind(u64_to_i64(booking.created_ms)?)
        .bind(event_id.0)
        .execute(&mut *tx)
        .await
        .context("failed to insert booking")?;

        if inserted.rows_affected() != 1 {
            // Dropping `tx` rolls back.
            bail!("event {event_id} does not exist");
        }

        tx.commit()
            .await
            .context("failed to commit ledger transaction")?;

        debug!(booking_id = %booking.id, %user_id, %event_id, quantity, "booking committed");
        Ok(booking)
    }

    async fn confirmed_quantity(&self, event_id: EventId) -> anyhow::Result<u64> {
        let row = sqlx::query(
            r#"
SELECT COALESCE(SUM(quantity), 0) AS total
FROM bookings
WHERE event_id = ? AND status = ?;
"#,
        )
        .bind(event_id.0)
        .bind(BookingStatus::Confirmed.to_string())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to sum confirmed tickets for event {event_id}"))?;

        i64_to_u64(row.get("total"))
    }

    async fn user_quantity(&self, user_id: UserId, event_id: EventId) -> anyhow::Result<u64> {
        let row = sqlx::query(
            r#"
SELECT COALESCE(SUM(quantity), 0) AS total
FROM bookings
WHERE user_id = ? AND event_id = ? AND status = ?;
"#,
        )
        .bind(user_id.0)
        .bind(event_id.0)
        .bind(BookingStatus::Confirmed.to_string())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to sum tickets of user {user_id} for event {event_id}"))?;

        i64_to_u64(row.get("total"))
    }

    async fn bookings_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<TicketSummary>> {
        let rows = sqlx::query(
            r#"
SELECT
  b.booking_id, b.user_id, b.event_id, b.quantity, b.status, b.created_ms,
  e.name AS event_name, e.price_cents
FROM bookings b
JOIN events e ON e.event_id = b.event_id
WHERE b.user_id = ?
ORDER BY b.booking_seq DESC;
"#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list bookings of user {user_id}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_summary(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    warn!(error = %e, %user_id, "skipping malformed booking row");
                }
            }
        }

        Ok(out)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_event(r: &sqlx::any::AnyRow) -> anyhow::Result<Event> {
    Ok(Event {
        id: EventId(r.get::<i64, _>("event_id")),
        name: r.get::<String, _>("name"),
        total_tickets: i64_to_u64(r.get("total_tickets"))?,
        price_cents: r.get::<i64, _>("price_cents"),
        created_ms: i64_to_u64(r.get("created_ms"))?,
    })
}

fn row_to_summary(r: &sqlx::any::AnyRow) -> anyhow::Result<TicketSummary> {
    let id_str: String = r.get("booking_id");
    let id = Uuid::parse_str(&id_str).context("invalid booking_id")?;

    let status_str: String = r.get("status");
    let status = status_str.parse::<BookingStatus>()?;

    Ok(TicketSummary {
        booking: Booking {
            id,
            user_id: UserId(r.get::<i64, _>("user_id")),
            event_id: EventId(r.get::<i64, _>("event_id")),
            quantity: i64_to_u32(r.get("quantity"))?,
            status,
            created_ms: i64_to_u64(r.get("created_ms"))?,
        },
        event_name: r.get::<String, _>("event_name"),
        price_cents: r.get::<i64, _>("price_cents"),
    })
}

/* =========================
Numeric safety helpers
========================= */

fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    u32::try_from(v).map_err(|_| anyhow!("out of range for u32: {v}"))
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("negative i64 where u64 expected: {v}"))
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("u64 too large for i64: {v}"))
}
