//! # Multicall Core
//!
//! Batching, deduplication and fallback execution of read-only contract calls.
//!
//! Many independent parts of an application ask for on-chain reads at roughly the same
//! time. This crate collects those reads, merges identical ones, waits a short throttle
//! window, and executes each chain's pending set as one multicall against a primary RPC
//! endpoint, retrying once on a fallback endpoint. Every caller gets back a result shaped
//! exactly like its own request.
//!
//! - **[`batching`]**: per-chain pending stores with identity-based deduplication, the
//!   urgent/background throttles, and fan-out of flat results back to every caller.
//!
//! - **[`dispatch`]**: routing of large batches to a dedicated worker thread.
//!
//! - **[`upstream`]**: endpoint pairs, the HTTP JSON-RPC transport, the batch executor and
//!   the sliding-window fallback switcher.
//!
//! - **[`engine`]**: [`MulticallEngine`], the entry point tying the above together.
//!
//! ## Request Flow
//!
//! ```text
//! submit(chain, request, priority)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Collector  │ ─── identical call pending ──► hook appended to existing entry
//! └──────┬──────┘
//!        │ new entry
//!        ▼
//! ┌─────────────┐
//! │  Scheduler  │  urgent 50ms / background 1000ms, trailing edge
//! └──────┬──────┘
//!        │ flush: one payload per chain
//!        ▼
//! ┌─────────────┐
//! │   Router    │ ─── calls >= threshold ──► worker thread
//! └──────┬──────┘
//!        ▼
//! ┌─────────────┐
//! │  Executor   │  selected endpoint, then one retry on the other
//! └──────┬──────┘
//!        ▼
//! ┌─────────────┐
//! │  Remapper   │ ─── every hook resolved exactly once ──► caller futures
//! └─────────────┘
//! ```

pub mod batching;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod identity;
pub mod logging;
pub mod telemetry;
pub mod types;
pub mod upstream;

pub use config::MulticallConfig;
pub use engine::{MulticallEngine, MulticallEngineBuilder, MulticallError, PendingResult};
pub use identity::CallIdentity;
pub use types::{
    CallGroup, CallReturn, CallSpec, ChainId, MulticallRequest, MulticallResult, Priority,
};
