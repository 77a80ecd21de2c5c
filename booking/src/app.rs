use std::sync::Arc;

use inventory::counter::{InMemoryCounterStore, RedisCounterStore};
use inventory::lock::{InMemoryLockManager, RedisLockManager};
use inventory::{CounterStore, LockManager};
use ledger::db::Db;
use ledger::{LedgerStore, SqlxLedgerStore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{AppConfig, InventoryBackend};
use crate::metrics::counters::Counters;
use crate::notification::{LogConfirmationSender, NotificationDispatcher, RetryPolicy};
use crate::policy::BookingPolicy;
use crate::reservation::orchestrator::{LockPolicy, ReservationService};
use crate::reservation::payment::SimulatedPayment;

/// A fully wired booking process: ledger, live inventory, notification worker and
/// the reservation service on top.
pub struct App {
    pub service: Arc<ReservationService>,
    pub policy: BookingPolicy,
    pub counters: Counters,
    notifier: JoinHandle<()>,
}

impl App {
    /// Connects and migrates the ledger, builds the configured inventory backend,
    /// starts the confirmation worker and, for the in-process backend, rebuilds
    /// every counter from the ledger.
    pub async fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let ledger = init_ledger(cfg).await?;
        let (locks, counter) = init_inventory(cfg).await?;
        let counters = Counters::default();

        let (dispatcher, notifier) = NotificationDispatcher::start(
            Arc::new(LogConfirmationSender::new(ledger.clone())),
            RetryPolicy {
                max_attempts: cfg.notify_max_attempts,
                backoff: cfg.notify_retry_backoff,
            },
            cfg.notify_queue_capacity,
            counters.clone(),
        );

        let payment = SimulatedPayment::new(cfg.payment_delay);
        let lock_policy = LockPolicy {
            lease: cfg.lock_lease,
            max_wait: cfg.lock_wait,
        };
        info!(
            payment_delay_ms = payment.delay().as_millis() as u64,
            lease_ms = lock_policy.lease.as_millis() as u64,
            max_wait_ms = lock_policy.max_wait.as_millis() as u64,
            "reservation service configured"
        );

        let service = Arc::new(ReservationService::new(
            locks,
            counter,
            ledger,
            Arc::new(dispatcher),
            payment,
            lock_policy,
            counters.clone(),
        ));

        // An in-process counter died with the previous process.
        if cfg.inventory_backend == InventoryBackend::Memory {
            service.recover_inventory().await?;
        }

        Ok(Self {
            service,
            policy: BookingPolicy::from_config(cfg),
            counters,
            notifier,
        })
    }

    /// Drops the service and waits for queued confirmations to drain.
    ///
    /// Any other clone of `service` still alive keeps the worker running.
    pub async fn shutdown(self) {
        let Self {
            service,
            counters,
            notifier,
            ..
        } = self;
        drop(service);

        if let Err(e) = notifier.await {
            warn!(error = ?e, "notification worker ended abnormally");
        }
        info!(counters = ?counters.snapshot(), "shutdown complete");
    }
}

async fn init_ledger(cfg: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlxLedgerStore::new(db.pool.clone())))
}

async fn init_inventory(
    cfg: &AppConfig,
) -> anyhow::Result<(Arc<dyn LockManager>, Arc<dyn CounterStore>)> {
    match cfg.inventory_backend {
        InventoryBackend::Memory => {
            info!("using in-process inventory; reservations are serialized within this process only");
            Ok((
                Arc::new(InMemoryLockManager::new()),
                Arc::new(InMemoryCounterStore::new()),
            ))
        }
        InventoryBackend::Redis => {
            info!(redis_url = %cfg.redis_url, "using redis inventory");
            let locks = RedisLockManager::connect(&cfg.redis_url, cfg.lock_poll_interval).await?;
            let counter = RedisCounterStore::connect(&cfg.redis_url).await?;
            Ok((Arc::new(locks), Arc::new(counter)))
        }
    }
}
