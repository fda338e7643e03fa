//! Background work: the in-process schedule backend and the run queue.

pub mod local_scheduler;
pub mod run_queue;

pub use local_scheduler::LocalScheduler;
pub use run_queue::{RunQueue, RunTicket};
