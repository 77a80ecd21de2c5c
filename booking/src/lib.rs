pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notification;
pub mod policy;
pub mod reservation;

pub use error::{PolicyViolation, ReservationError};
pub use reservation::orchestrator::{LockPolicy, ReservationService};
