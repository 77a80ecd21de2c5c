use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Events
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS events (
  event_id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  total_tickets BIGINT NOT NULL CHECK (total_tickets >= 0),
  price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
  created_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Bookings (ledger)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bookings (
  booking_seq INTEGER PRIMARY KEY,
  booking_id TEXT NOT NULL UNIQUE,
  user_id BIGINT NOT NULL,
  event_id BIGINT NOT NULL REFERENCES events(event_id),
  quantity BIGINT NOT NULL CHECK (quantity >= 1),
  status TEXT NOT NULL,
  created_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_bookings_event ON bookings(event_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_bookings_user_event ON bookings(user_id, event_id);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
