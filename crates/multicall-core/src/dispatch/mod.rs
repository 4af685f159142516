//! Execution routing: host runtime or worker thread.

pub mod router;
pub mod worker;

pub use router::{select_target, ExecutionRouter, ExecutionTarget};
pub use worker::{WorkerBridge, WorkerError};
