use std::time::Duration;

use ledger::EventId;
use thiserror::Error;

use crate::reservation::phase::ReservationPhase;

/// Outcome taxonomy of `reserve` and the administrative inventory operations.
///
/// `SoldOut` and `Busy` are expected and leave counter and ledger untouched.
/// `LedgerWrite` means the counter was decremented, the durable write failed and
/// the decrement was compensated. `Failed` is any other infrastructure fault.
#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("{}", sold_out_message(*event_id, *requested, *available))]
    SoldOut {
        event_id: EventId,
        requested: u32,
        available: i64,
    },

    #[error("event #{event_id} is busy; lock not acquired within {waited:?}")]
    Busy { event_id: EventId, waited: Duration },

    #[error("booking for event #{event_id} could not be recorded; inventory restored")]
    LedgerWrite {
        event_id: EventId,
        #[source]
        source: anyhow::Error,
    },

    #[error("reservation failed while {phase}")]
    Failed {
        phase: ReservationPhase,
        #[source]
        source: anyhow::Error,
    },

    /// Counter fault in an administrative operation (initialize, read).
    #[error("inventory operation on event #{event_id} failed")]
    Inventory {
        event_id: EventId,
        #[source]
        source: anyhow::Error,
    },

    #[error("event provisioning failed")]
    Provisioning(#[source] anyhow::Error),
}

impl ReservationError {
    pub fn is_sold_out(&self) -> bool {
        matches!(self, ReservationError::SoldOut { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, ReservationError::Busy { .. })
    }

    /// Only contention is worth retrying from a higher layer.
    pub fn is_retryable(&self) -> bool {
        self.is_busy()
    }

    pub(crate) fn failed(phase: ReservationPhase, source: impl Into<anyhow::Error>) -> Self {
        ReservationError::Failed {
            phase,
            source: source.into(),
        }
    }
}

fn sold_out_message(event_id: EventId, requested: u32, available: i64) -> String {
    if available <= 0 {
        format!("Event #{event_id} is sold out.")
    } else {
        format!(
            "Only {available} ticket(s) remaining for Event #{event_id}, but {requested} requested."
        )
    }
}

/// Request-level rejections raised before `reserve` is called.
#[derive(Error, Debug)]
pub enum PolicyViolation {
    #[error("You must book at least 1 ticket.")]
    ZeroQuantity,

    #[error("You cannot book more than {max} tickets at a time.")]
    TooManyPerBooking { max: u32 },

    #[error("The selected event does not exist.")]
    UnknownEvent { event_id: EventId },

    #[error("You have already booked the maximum of {max} tickets for this event.")]
    UserCapReached { max: u32 },

    #[error("You can only book {remaining} more ticket(s) for this event.")]
    UserCapExceeded { remaining: u32 },

    #[error("booking policy lookup failed")]
    Lookup(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sold_out_message_distinguishes_empty_from_short() {
        let empty = ReservationError::SoldOut {
            event_id: EventId(3),
            requested: 1,
            available: 0,
        };
        assert_eq!(empty.to_string(), "Event #3 is sold out.");

        let short = ReservationError::SoldOut {
            event_id: EventId(3),
            requested: 150,
            available: 100,
        };
        let msg = short.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("150"));
    }

    #[test]
    fn classification_helpers() {
        let busy = ReservationError::Busy {
            event_id: EventId(1),
            waited: Duration::from_secs(45),
        };
        assert!(busy.is_busy());
        assert!(busy.is_retryable());
        assert!(!busy.is_sold_out());

        let failed = ReservationError::failed(
            ReservationPhase::Committing,
            anyhow::anyhow!("disk full"),
        );
        assert!(!failed.is_retryable());
        assert_eq!(failed.to_string(), "reservation failed while committing");

        let source = std::error::Error::source(&failed).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }
}
