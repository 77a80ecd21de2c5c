use std::fmt;

/// Steps of one reservation, in order. Used to tag logs and failures.
///
/// ```text
/// LockPending -> Locked -> Checking -> Reserving -> Committing -> Committed | Compensating -> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationPhase {
    LockPending,
    Locked,
    Checking,
    Reserving,
    Committing,
    Committed,
    Compensating,
    Done,
}

impl fmt::Display for ReservationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationPhase::LockPending => "acquiring lock",
            ReservationPhase::Locked => "locked",
            ReservationPhase::Checking => "checking",
            ReservationPhase::Reserving => "reserving",
            ReservationPhase::Committing => "committing",
            ReservationPhase::Committed => "committed",
            ReservationPhase::Compensating => "compensating",
            ReservationPhase::Done => "releasing lock",
        };
        f.write_str(s)
    }
}
