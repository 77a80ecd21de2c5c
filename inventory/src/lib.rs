//! Live inventory primitives: a fast per-event counter and a per-event lease lock.
//!
//! Both come as async traits with an in-process implementation (tests, single-node
//! deployments) and a Redis implementation (shared across processes and machines).

pub mod counter;
pub mod keys;
pub mod lock;

pub use counter::CounterStore;
pub use lock::{LockError, LockManager, LockToken};
