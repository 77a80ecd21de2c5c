use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use crate::policy::MAX_TICKETS_PER_BOOKING;

/// Where live inventory (counter + lock) lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InventoryBackend {
    /// Process-local; serializes reservations of this process only.
    Memory,
    /// Shared Redis instance; serializes reservations across processes.
    Redis,
}

impl FromStr for InventoryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(InventoryBackend::Memory),
            "redis" => Ok(InventoryBackend::Redis),
            other => Err(anyhow::anyhow!("Invalid inventory backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Ledger database connection string.
    pub database_url: String,

    /// Whether JSON logs are emitted (production) instead of pretty output.
    pub json_logs: bool,

    // =========================
    // Inventory configuration
    // =========================
    pub inventory_backend: InventoryBackend,

    /// Only read when `inventory_backend` is `Redis`.
    pub redis_url: String,

    /// Maximum time one holder keeps an event lock without releasing it.
    ///
    /// Must cover the slowest legitimate critical section (payment step plus the
    /// ledger write), and bounds how long a crashed holder blocks the event.
    pub lock_lease: Duration,

    /// Maximum time a booking request queues for the event lock before
    /// failing with a busy error.
    pub lock_wait: Duration,

    /// Retry cadence of the Redis lock while waiting.
    pub lock_poll_interval: Duration,

    /// Simulated payment step, executed inside the critical section.
    pub payment_delay: Duration,

    // =========================
    // Request policy
    // =========================
    pub max_tickets_per_booking: u32,

    /// Cumulative cap per user per event.
    pub max_tickets_per_user: u32,

    // =========================
    // Notification configuration
    // =========================
    /// Bounded queue between reservations and the confirmation worker.
    /// A full queue drops the confirmation (logged), never blocks a booking.
    pub notify_queue_capacity: usize,

    pub notify_max_attempts: u32,

    /// Fixed delay between delivery attempts.
    pub notify_retry_backoff: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://boxoffice_dev.db?mode=rwc".to_string(),
            json_logs: false,

            inventory_backend: InventoryBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),

            lock_lease: Duration::from_secs(45),
            lock_wait: Duration::from_secs(45),
            lock_poll_interval: Duration::from_millis(250),
            payment_delay: Duration::from_secs(30),

            max_tickets_per_booking: 4,
            max_tickets_per_user: 4,

            notify_queue_capacity: 1024,
            notify_max_attempts: 3,
            notify_retry_backoff: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let cfg = Self {
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            json_logs: lookup("APP_ENV").is_some_and(|v| v == "production"),

            inventory_backend: parse_or(&lookup, "INVENTORY_BACKEND", d.inventory_backend)?,
            redis_url: lookup("REDIS_URL").unwrap_or(d.redis_url),

            lock_lease: millis_or(&lookup, "LOCK_LEASE_MS", d.lock_lease)?,
            lock_wait: millis_or(&lookup, "LOCK_WAIT_MS", d.lock_wait)?,
            lock_poll_interval: millis_or(&lookup, "LOCK_POLL_MS", d.lock_poll_interval)?,
            payment_delay: millis_or(&lookup, "PAYMENT_DELAY_MS", d.payment_delay)?,

            max_tickets_per_booking: parse_or(
                &lookup,
                "MAX_TICKETS_PER_BOOKING",
                d.max_tickets_per_booking,
            )?,
            max_tickets_per_user: parse_or(
                &lookup,
                "MAX_TICKETS_PER_USER",
                d.max_tickets_per_user,
            )?,

            notify_queue_capacity: parse_or(
                &lookup,
                "NOTIFY_QUEUE_CAPACITY",
                d.notify_queue_capacity,
            )?,
            notify_max_attempts: parse_or(&lookup, "NOTIFY_MAX_ATTEMPTS", d.notify_max_attempts)?,
            notify_retry_backoff: millis_or(
                &lookup,
                "NOTIFY_RETRY_BACKOFF_MS",
                d.notify_retry_backoff,
            )?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_lease <= self.payment_delay {
            bail!(
                "lock lease ({:?}) must exceed the payment delay ({:?})",
                self.lock_lease,
                self.payment_delay
            );
        }
        if self.lock_wait.is_zero() {
            bail!("lock wait must be non-zero");
        }
        if self.lock_poll_interval.is_zero() {
            bail!("lock poll interval must be non-zero");
        }
        if self.max_tickets_per_booking == 0 || self.max_tickets_per_booking > MAX_TICKETS_PER_BOOKING
        {
            bail!(
                "max tickets per booking must be within 1..={MAX_TICKETS_PER_BOOKING}, got {}",
                self.max_tickets_per_booking
            );
        }
        if self.max_tickets_per_user == 0 {
            bail!("max tickets per user must be non-zero");
        }
        if self.notify_queue_capacity == 0 {
            bail!("notification queue capacity must be non-zero");
        }
        if self.notify_max_attempts == 0 {
            bail!("notification attempts must be non-zero");
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = default.as_millis() as u64;
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(cfg.inventory_backend, InventoryBackend::Memory);
        assert_eq!(cfg.lock_lease, Duration::from_secs(45));
        assert_eq!(cfg.payment_delay, Duration::from_secs(30));
        assert_eq!(cfg.max_tickets_per_user, 4);
        assert!(!cfg.json_logs);
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("INVENTORY_BACKEND", "Redis"),
            ("LOCK_LEASE_MS", "5000"),
            ("PAYMENT_DELAY_MS", "0"),
            ("NOTIFY_MAX_ATTEMPTS", "5"),
            ("APP_ENV", "production"),
        ]))
        .unwrap();

        assert_eq!(cfg.inventory_backend, InventoryBackend::Redis);
        assert_eq!(cfg.lock_lease, Duration::from_secs(5));
        assert_eq!(cfg.payment_delay, Duration::ZERO);
        assert_eq!(cfg.notify_max_attempts, 5);
        assert!(cfg.json_logs);
    }

    #[test]
    fn lease_shorter_than_payment_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("LOCK_LEASE_MS", "10000"),
            ("PAYMENT_DELAY_MS", "30000"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("must exceed the payment delay"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = AppConfig::from_lookup(lookup_from(&[("LOCK_WAIT_MS", "soon")])).unwrap_err();
        assert!(format!("{err:?}").contains("LOCK_WAIT_MS"));
    }

    #[test]
    fn per_booking_cap_is_bounded_by_policy_ceiling() {
        let err = AppConfig::from_lookup(lookup_from(&[("MAX_TICKETS_PER_BOOKING", "6")]))
            .unwrap_err();
        assert!(err.to_string().contains("max tickets per booking"));

        let cfg =
            AppConfig::from_lookup(lookup_from(&[("MAX_TICKETS_PER_BOOKING", "2")])).unwrap();
        assert_eq!(cfg.max_tickets_per_booking, 2);
    }

    #[test]
    fn unknown_inventory_backend_is_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("INVENTORY_BACKEND", "etcd")])).is_err());

        let cfg = AppConfig::from_lookup(lookup_from(&[("INVENTORY_BACKEND", "Redis")])).unwrap();
        assert_eq!(cfg.inventory_backend, InventoryBackend::Redis);
    }
}
