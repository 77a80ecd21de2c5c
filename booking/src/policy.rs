use ledger::{EventId, LedgerStore, UserId};

use crate::config::AppConfig;
use crate::error::PolicyViolation;

/// Hard ceiling for the configurable per-request cap.
pub const MAX_TICKETS_PER_BOOKING: u32 = 4;

/// Request validation run before `reserve`: per-booking cap, event existence and
/// the cumulative per-user cap.
///
/// The per-user check reads the ledger without the event lock, so two concurrent
/// requests from the same user may both pass it.
#[derive(Clone, Copy, Debug)]
pub struct BookingPolicy {
    pub max_per_booking: u32,
    pub max_per_user: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_per_booking: MAX_TICKETS_PER_BOOKING,
            max_per_user: 4,
        }
    }
}

impl BookingPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_per_booking: cfg.max_tickets_per_booking,
            max_per_user: cfg.max_tickets_per_user,
        }
    }

    pub async fn check(
        &self,
        ledger: &dyn LedgerStore,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<(), PolicyViolation> {
        if quantity == 0 {
            return Err(PolicyViolation::ZeroQuantity);
        }
        if quantity > self.max_per_booking {
            return Err(PolicyViolation::TooManyPerBooking {
                max: self.max_per_booking,
            });
        }

        let event = ledger
            .fetch_event(event_id)
            .await
            .map_err(PolicyViolation::Lookup)?;
        if event.is_none() {
            return Err(PolicyViolation::UnknownEvent { event_id });
        }

        let held = ledger
            .user_quantity(user_id, event_id)
            .await
            .map_err(PolicyViolation::Lookup)?;
        let remaining = u64::from(self.max_per_user).saturating_sub(held);

        if remaining == 0 {
            return Err(PolicyViolation::UserCapReached {
                max: self.max_per_user,
            });
        }
        if u64::from(quantity) > remaining {
            return Err(PolicyViolation::UserCapExceeded {
                // remaining < quantity <= u32::MAX
                remaining: remaining as u32,
            });
        }

        Ok(())
    }
}
