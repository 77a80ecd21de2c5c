pub mod db;
pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{Booking, BookingId, BookingStatus, Event, EventId, NewEvent, TicketSummary, UserId};
pub use repository::LedgerStore;
pub use repository_sqlx::SqlxLedgerStore;
