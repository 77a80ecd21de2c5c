//! Post-commit booking confirmations.
//!
//! The orchestrator only ever calls [`NotificationTrigger::enqueue`], which must not
//! block and must not fail: a confirmation that cannot be queued or delivered is
//! logged and counted, and the committed booking stands.

pub mod dispatcher;
pub mod sender;

use async_trait::async_trait;
use ledger::Booking;

pub use dispatcher::{NotificationDispatcher, RetryPolicy};
pub use sender::LogConfirmationSender;

/// Fire-and-forget hand-off of a committed booking.
pub trait NotificationTrigger: Send + Sync {
    fn enqueue(&self, booking: &Booking);
}

/// Delivers one confirmation message. Errors are retried by the dispatcher.
#[async_trait]
pub trait ConfirmationSender: Send + Sync + 'static {
    async fn send(&self, booking: &Booking) -> anyhow::Result<()>;
}
