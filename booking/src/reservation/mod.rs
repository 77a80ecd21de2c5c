pub mod orchestrator;
pub mod payment;
pub mod phase;
