//! Reservation orchestrator: turns available inventory into durable bookings.
//!
//! One reservation runs entirely under the event's lock:
//!
//! 1. acquire the per-event lock (bounded wait, else `Busy`)
//! 2. read the counter; reject with `SoldOut` if it cannot cover the request
//! 3. run the payment step
//! 4. decrement the counter (inventory is spent before the durable write)
//! 5. write the booking in one ledger transaction
//!    - success: enqueue the confirmation and return the booking
//!    - failure: increment the counter back, log, return `LedgerWrite`
//! 6. release the lock on every exit path
//!
//! Every locked sequence runs on its own task. Dropping the caller's future (a
//! timeout, a disconnected client) does not cancel it, so the counter, the ledger
//! and the lock always reach one of the terminal states above.
//!
//! Only this type mutates the counter, and only while holding that event's lock.
//! A crash between steps 4 and 5 leaves the counter understated until
//! `reconcile_inventory` runs; that gap is accepted in exchange for a short
//! critical section.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::logger::{annotate_span, child_span, warn_if_slow};
use inventory::keys::{inventory_key, lock_key};
use inventory::{CounterStore, LockError, LockManager, LockToken};
use ledger::{Booking, Event, EventId, LedgerStore, NewEvent, UserId};
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use crate::error::ReservationError;
use crate::metrics::counters::{Counters, bump};
use crate::notification::NotificationTrigger;
use crate::reservation::payment::SimulatedPayment;
use crate::reservation::phase::ReservationPhase;

/// Lease and wait applied to every event lock taken by the service.
#[derive(Clone, Copy, Debug)]
pub struct LockPolicy {
    pub lease: Duration,
    pub max_wait: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(45),
            max_wait: Duration::from_secs(45),
        }
    }
}

#[derive(Clone)]
pub struct ReservationService {
    locks: Arc<dyn LockManager>,
    counter: Arc<dyn CounterStore>,
    ledger: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationTrigger>,
    payment: SimulatedPayment,
    lock_policy: LockPolicy,
    counters: Counters,
}

impl ReservationService {
    pub fn new(
        locks: Arc<dyn LockManager>,
        counter: Arc<dyn CounterStore>,
        ledger: Arc<dyn LedgerStore>,
        notifier: Arc<dyn NotificationTrigger>,
        payment: SimulatedPayment,
        lock_policy: LockPolicy,
        counters: Counters,
    ) -> Self {
        Self {
            locks,
            counter,
            ledger,
            notifier,
            payment,
            lock_policy,
            counters,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Reserves `quantity` tickets of `event_id` for `user_id`.
    ///
    /// `quantity` is expected to be validated already (see `BookingPolicy`).
    #[instrument(
        skip_all,
        target = "reservation",
        fields(event_id = %event_id, user_id = %user_id, quantity = quantity)
    )]
    pub async fn reserve(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, ReservationError> {
        self.detached(move |svc| async move {
            svc.run_reservation(user_id, event_id, quantity).await
        })
        .await
    }

    /// Runs `work` on its own task and awaits it. Dropping the returned future leaves
    /// `work` running to completion.
    async fn detached<T, F, Fut>(&self, work: F) -> Result<T, ReservationError>
    where
        F: FnOnce(ReservationService) -> Fut,
        Fut: Future<Output = Result<T, ReservationError>> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::spawn(work(self.clone()).instrument(Span::current()));

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                bump(&self.counters.failed);
                error!(error = ?e, "locked section task did not complete");
                Err(ReservationError::failed(ReservationPhase::Done, e))
            }
        }
    }

    async fn run_reservation(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, ReservationError> {
        bump(&self.counters.attempts);

        let outcome = match self.lock_event(event_id).await {
            Ok(token) => {
                let outcome = self.reserve_locked(user_id, event_id, quantity).await;
                self.unlock_event(token).await;
                outcome
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(booking) => {
                bump(&self.counters.committed);
                info!(booking_id = %booking.id, "reservation committed");
            }
            Err(ReservationError::SoldOut { available, .. }) => {
                bump(&self.counters.sold_out);
                info!(available, "reservation rejected: sold out");
            }
            Err(ReservationError::Busy { .. }) => bump(&self.counters.busy),
            // counted by `compensate`
            Err(ReservationError::LedgerWrite { .. }) => {}
            Err(e) => {
                bump(&self.counters.failed);
                error!(error = ?e, "reservation failed");
            }
        }

        outcome
    }

    /// Critical section. Caller holds the event lock for the whole call.
    async fn reserve_locked(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, ReservationError> {
        let key = inventory_key(event_id.0);

        debug!(phase = %ReservationPhase::Checking, "reading live inventory");
        let available = self
            .counter
            .get(&key)
            .await
            .map_err(|e| ReservationError::failed(ReservationPhase::Checking, e))?;

        if i64::from(quantity) > available {
            return Err(ReservationError::SoldOut {
                event_id,
                requested: quantity,
                available,
            });
        }

        self.payment.charge(event_id, quantity).await;

        debug!(phase = %ReservationPhase::Reserving, available, "decrementing inventory");
        let remaining = self
            .counter
            .decrement_by(&key, u64::from(quantity))
            .await
            .map_err(|e| ReservationError::failed(ReservationPhase::Reserving, e))?;

        debug!(phase = %ReservationPhase::Committing, remaining, "writing booking");
        let written = async {
            annotate_span(event_id.0, Some(user_id.0));
            warn_if_slow("ledger_create_booking", Duration::from_millis(200), async {
                self.ledger.create_booking(user_id, event_id, quantity).await
            })
            .await
        }
        .instrument(child_span("ledger_write"))
        .await;

        match written {
            Ok(booking) => {
                debug!(phase = %ReservationPhase::Committed, booking_id = %booking.id);
                self.notifier.enqueue(&booking);
                Ok(booking)
            }
            Err(source) => Err(self
                .compensate(&key, user_id, event_id, quantity, source)
                .await),
        }
    }

    /// Restores the decrement after a failed ledger write and builds the error to
    /// re-raise. The original ledger error is always the one returned.
    async fn compensate(
        &self,
        key: &str,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
        source: anyhow::Error,
    ) -> ReservationError {
        debug!(phase = %ReservationPhase::Compensating, "restoring inventory");

        match self.counter.increment_by(key, u64::from(quantity)).await {
            Ok(restored) => {
                bump(&self.counters.compensated);
                error!(
                    %user_id,
                    %event_id,
                    quantity,
                    restored,
                    error = ?source,
                    "ledger transaction failed; inventory rolled back"
                );
            }
            Err(increment_err) => {
                bump(&self.counters.compensation_failed);
                error!(
                    %user_id,
                    %event_id,
                    quantity,
                    error = ?source,
                    compensation_error = ?increment_err,
                    "ledger transaction failed and inventory could not be restored; reconciliation required"
                );
            }
        }

        ReservationError::LedgerWrite { event_id, source }
    }

    async fn lock_event(&self, event_id: EventId) -> Result<LockToken, ReservationError> {
        debug!(phase = %ReservationPhase::LockPending, "waiting for event lock");

        let acquired = self
            .locks
            .acquire(
                &lock_key(event_id.0),
                self.lock_policy.lease,
                self.lock_policy.max_wait,
            )
            .await;

        match acquired {
            Ok(token) => {
                debug!(phase = %ReservationPhase::Locked, owner = %token.owner());
                Ok(token)
            }
            Err(LockError::Busy { waited, .. }) => {
                warn!(%event_id, waited_ms = waited.as_millis() as u64, "event lock busy");
                Err(ReservationError::Busy { event_id, waited })
            }
            Err(LockError::Backend(e)) => Err(ReservationError::failed(
                ReservationPhase::LockPending,
                e,
            )),
        }
    }

    /// Releases on every exit path. A failed release is only logged: the lease
    /// expiry frees the key regardless.
    async fn unlock_event(&self, token: LockToken) {
        let held_for = token.held_for();
        let lease = token.lease();

        match self.locks.release(token).await {
            Ok(true) => {
                debug!(phase = %ReservationPhase::Done, held_ms = held_for.as_millis() as u64);
            }
            Ok(false) => {
                warn!(
                    held_ms = held_for.as_millis() as u64,
                    lease_ms = lease.as_millis() as u64,
                    "critical section outlived the lock lease"
                );
            }
            Err(e) => {
                warn!(error = ?e, "lock release failed; lease expiry will free it");
            }
        }
    }

    /* =========================
    Administrative operations
    ========================= */

    /// Sets the live counter of `event_id` to `total_tickets`.
    ///
    /// The only creator of a counter; also used to reset it.
    #[instrument(skip_all, target = "reservation", fields(event_id = %event_id))]
    pub async fn initialize_inventory(
        &self,
        event_id: EventId,
        total_tickets: u64,
    ) -> Result<(), ReservationError> {
        let value = i64::try_from(total_tickets).map_err(|_| ReservationError::Inventory {
            event_id,
            source: anyhow::anyhow!("ticket count too large: {total_tickets}"),
        })?;

        self.detached(move |svc| async move { svc.set_counter(event_id, value).await })
            .await?;

        info!(total_tickets, "inventory initialized");
        Ok(())
    }

    async fn set_counter(&self, event_id: EventId, value: i64) -> Result<(), ReservationError> {
        let token = self.lock_event(event_id).await?;
        let set = self.counter.set(&inventory_key(event_id.0), value).await;
        self.unlock_event(token).await;

        set.map_err(|source| ReservationError::Inventory { event_id, source })
    }

    /// Live available count. Lock-free read; intended for display.
    pub async fn available_count(&self, event_id: EventId) -> Result<i64, ReservationError> {
        self.counter
            .get(&inventory_key(event_id.0))
            .await
            .map_err(|source| ReservationError::Inventory { event_id, source })
    }

    /// Creates the event in the ledger, then its counter.
    #[instrument(skip_all, target = "reservation", fields(name = %event.name))]
    pub async fn provision_event(&self, event: NewEvent) -> Result<Event, ReservationError> {
        let event = self
            .ledger
            .create_event(event)
            .await
            .map_err(ReservationError::Provisioning)?;

        self.initialize_inventory(event.id, event.total_tickets)
            .await?;

        info!(event_id = %event.id, total_tickets = event.total_tickets, "event provisioned");
        Ok(event)
    }

    /// Rebuilds the counter from the ledger: `total_tickets - sum(confirmed)`.
    ///
    /// Runs under the event lock so no reservation is mid-flight. Returns the new value.
    #[instrument(skip_all, target = "reservation", fields(event_id = %event_id))]
    pub async fn reconcile_inventory(&self, event_id: EventId) -> Result<i64, ReservationError> {
        self.detached(move |svc| async move { svc.reconcile_held(event_id).await })
            .await
    }

    async fn reconcile_held(&self, event_id: EventId) -> Result<i64, ReservationError> {
        let token = self.lock_event(event_id).await?;
        let outcome = self.reconcile_locked(event_id).await;
        self.unlock_event(token).await;
        outcome
    }

    async fn reconcile_locked(&self, event_id: EventId) -> Result<i64, ReservationError> {
        let inventory_err =
            |source: anyhow::Error| ReservationError::failed(ReservationPhase::Checking, source);

        let event = self
            .ledger
            .fetch_event(event_id)
            .await
            .map_err(inventory_err)?
            .ok_or_else(|| inventory_err(anyhow::anyhow!("event {event_id} does not exist")))?;

        let sold = self
            .ledger
            .confirmed_quantity(event_id)
            .await
            .map_err(inventory_err)?;

        if sold > event.total_tickets {
            warn!(
                sold,
                total_tickets = event.total_tickets,
                "ledger holds more tickets than capacity; clamping inventory to 0"
            );
        }

        let available = i64::try_from(event.total_tickets.saturating_sub(sold))
            .map_err(|_| inventory_err(anyhow::anyhow!("ticket count out of range")))?;

        let key = inventory_key(event_id.0);
        let before = self.counter.get(&key).await.map_err(inventory_err)?;
        self.counter.set(&key, available).await.map_err(inventory_err)?;

        if before != available {
            warn!(before, after = available, "inventory counter was out of sync; reconciled");
        } else {
            debug!(available, "inventory counter already in sync");
        }

        Ok(available)
    }

    /// Reconciles every event in the ledger. Used at startup when the counter
    /// lives in this process and was lost with the previous one.
    #[instrument(skip_all, target = "reservation")]
    pub async fn recover_inventory(&self) -> Result<usize, ReservationError> {
        let events = self
            .ledger
            .list_events()
            .await
            .map_err(ReservationError::Provisioning)?;

        for event in &events {
            self.reconcile_inventory(event.id).await?;
        }

        info!(events = events.len(), "inventory recovered from ledger");
        Ok(events.len())
    }
}
