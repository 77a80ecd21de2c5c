use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use ledger::Booking;

use super::{ConfirmationSender, NotificationTrigger};
use crate::metrics::counters::{Counters, bump};

/// Bounded attempts with a fixed pause between them.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Producer side of the confirmation queue.
///
/// Guarantees:
/// - `enqueue` never blocks and never reports failure to the caller
/// - memory is bounded by the queue capacity; overflow drops (and counts) the message
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Sender<Booking>,
    counters: Counters,
}

impl NotificationDispatcher {
    /// Spawns the delivery worker and returns the producer handle.
    ///
    /// The worker exits once every dispatcher clone is dropped and in-flight
    /// deliveries have finished.
    pub fn start<S: ConfirmationSender>(
        sender: Arc<S>,
        retry: RetryPolicy,
        capacity: usize,
        counters: Counters,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let worker = ConfirmationWorker {
            sender,
            retry,
            counters: counters.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));

        (Self { tx, counters }, handle)
    }
}

impl NotificationTrigger for NotificationDispatcher {
    fn enqueue(&self, booking: &Booking) {
        match self.tx.try_send(booking.clone()) {
            Ok(()) => {
                bump(&self.counters.notify_enqueued);
                debug!(booking_id = %booking.id, "confirmation enqueued");
            }
            Err(TrySendError::Full(b)) => {
                bump(&self.counters.notify_dropped);
                warn!(
                    booking_id = %b.id,
                    event_id = %b.event_id,
                    "confirmation queue full; confirmation dropped"
                );
            }
            Err(TrySendError::Closed(b)) => {
                bump(&self.counters.notify_dropped);
                warn!(
                    booking_id = %b.id,
                    event_id = %b.event_id,
                    "confirmation worker gone; confirmation dropped"
                );
            }
        }
    }
}

/// Consumes the queue and delivers each confirmation on its own task, so one
/// slow retry does not hold back the others.
struct ConfirmationWorker<S: ConfirmationSender> {
    sender: Arc<S>,
    retry: RetryPolicy,
    counters: Counters,
}

impl<S: ConfirmationSender> ConfirmationWorker<S> {
    async fn run(self, mut rx: Receiver<Booking>) {
        info!(component = "notifier", event = "startup", "Confirmation worker started");

        let mut in_flight = JoinSet::new();

        while let Some(booking) = rx.recv().await {
            let span = info_span!(
                "confirmation",
                booking_id = %booking.id,
                event_id = %booking.event_id
            );

            let sender = Arc::clone(&self.sender);
            let counters = self.counters.clone();
            let retry = self.retry;
            in_flight.spawn(deliver(sender, retry, counters, booking).instrument(span));

            // Reap finished deliveries without waiting.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}

        info!(component = "notifier", event = "shutdown", "Confirmation worker drained");
    }
}

async fn deliver<S: ConfirmationSender>(
    sender: Arc<S>,
    retry: RetryPolicy,
    counters: Counters,
    booking: Booking,
) {
    let max_attempts = retry.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match sender.send(&booking).await {
            Ok(()) => {
                bump(&counters.notify_delivered);
                debug!(attempt, "confirmation delivered");
                return;
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = ?e, "confirmation delivery failed");
                if attempt < max_attempts {
                    tokio::time::sleep(retry.backoff).await;
                }
            }
        }
    }

    bump(&counters.notify_failed);
    error!(
        user_id = %booking.user_id,
        quantity = booking.quantity,
        max_attempts,
        "giving up on confirmation; booking remains confirmed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger::{BookingStatus, EventId, UserId};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn mk_booking() -> Booking {
        Booking {
            id: uuid::Uuid::new_v4(),
            user_id: UserId(1),
            event_id: EventId(1),
            quantity: 2,
            status: BookingStatus::Confirmed,
            created_ms: 0,
        }
    }

    /// Fails the first `fail_first` calls, then succeeds.
    struct FlakySender {
        calls: AtomicU32,
        fail_first: u32,
        delivered: Mutex<Vec<Booking>>,
    }

    impl FlakySender {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                delivered: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ConfirmationSender for FlakySender {
        async fn send(&self, booking: &Booking) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                anyhow::bail!("mailer unavailable");
            }
            self.delivered.lock().push(booking.clone());
            Ok(())
        }
    }

    /// Parks every send until the test lets go.
    struct StuckSender;

    #[async_trait]
    impl ConfirmationSender for StuckSender {
        async fn send(&self, _: &Booking) -> anyhow::Result<()> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_delivered() {
        let sender = Arc::new(FlakySender::new(2));
        let counters = Counters::default();
        let (dispatcher, handle) = NotificationDispatcher::start(
            sender.clone(),
            RetryPolicy::default(),
            8,
            counters.clone(),
        );

        let booking = mk_booking();
        dispatcher.enqueue(&booking);
        drop(dispatcher);
        handle.await.unwrap();

        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sender.delivered.lock().as_slice(), &[booking]);

        let snap = counters.snapshot();
        assert_eq!(snap.notify_enqueued, 1);
        assert_eq!(snap.notify_delivered, 1);
        assert_eq!(snap.notify_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let sender = Arc::new(FlakySender::new(u32::MAX));
        let counters = Counters::default();
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(10),
        };
        let (dispatcher, handle) =
            NotificationDispatcher::start(sender.clone(), retry, 8, counters.clone());

        let start = tokio::time::Instant::now();
        dispatcher.enqueue(&mk_booking());
        drop(dispatcher);
        handle.await.unwrap();

        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
        // Two pauses between three attempts.
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert_eq!(counters.snapshot().notify_failed, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let counters = Counters::default();
        let (dispatcher, _handle) = NotificationDispatcher::start(
            Arc::new(StuckSender),
            RetryPolicy::default(),
            1,
            counters.clone(),
        );

        for _ in 0..50 {
            dispatcher.enqueue(&mk_booking());
        }

        let snap = counters.snapshot();
        assert_eq!(snap.notify_enqueued + snap.notify_dropped, 50);
        assert!(snap.notify_dropped > 0);
    }

    #[tokio::test]
    async fn closed_queue_is_counted_not_raised() {
        let counters = Counters::default();
        let (dispatcher, handle) = NotificationDispatcher::start(
            Arc::new(FlakySender::new(0)),
            RetryPolicy::default(),
            4,
            counters.clone(),
        );
        handle.abort();
        let _ = handle.await;

        dispatcher.enqueue(&mk_booking());

        assert_eq!(counters.snapshot().notify_dropped, 1);
    }
}
