//! Collection, scheduling and result fan-out of read calls.
//!
//! - [`Collector`]: per-chain pending stores with identity-based deduplication
//! - [`Scheduler`]: urgent and background trailing-edge throttles
//! - [`remap::expand`]: delivers a flat [`BatchResult`](crate::types::BatchResult) to every
//!   waiting caller

pub mod collector;
pub mod remap;
pub mod scheduler;

pub use collector::{Collector, Hook, PendingEntry, PendingStore, Submission};
pub use remap::expand;
pub use scheduler::{FlushTarget, Scheduler};
