//! Application layer containing the billing orchestration.
//!
//! The `RecurringScheduler` owns the execution timeline and fires batches
//! through the `BatchRunner` seam. `BatchCoordinator` is the production runner:
//! it fans a batch out to the `PaymentProcessor`, which moves each invoice
//! through its status state machine.

pub mod cadence;
pub mod coordinator;
pub mod processor;
pub mod scheduler;
