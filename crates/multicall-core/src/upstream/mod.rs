//! Endpoint selection, physical execution and fallback.
//!
//! This module owns everything that talks to RPC endpoints:
//! - [`EndpointPair`]: the primary and fallback endpoint of a chain
//! - [`MulticallTransport`] and [`HttpTransport`]: one physical multicall against one endpoint
//! - [`BatchExecutor`]: time-boxed attempt on the selected endpoint, one retry on the other
//! - [`FallbackSwitcher`]: sliding-window circuit breaker deciding which endpoint is selected
//!
//! ## Example Flow
//!
//! ```text
//! BatchJob ─► BatchExecutor ─► [prefer_fallback?]
//!                                 │
//!                                 ├─ No  → primary  ─(fail)─► fallback
//!                                 │
//!                                 └─ Yes → fallback ─(fail)─► primary
//!
//! primary attempt failed ─► on_primary_failure ─► FallbackSwitcher::record_failure (host side)
//! ```

pub mod endpoint;
pub mod errors;
pub mod executor;
pub mod http_client;
pub mod switcher;
pub mod transport;

pub use endpoint::{Endpoint, EndpointKind, EndpointPair, DEFAULT_MAX_BATCH_SIZE};
pub use errors::{RpcErrorCategory, TransportError};
pub use executor::{BatchExecutor, BatchJob, ExecutionReport};
pub use http_client::HttpClient;
pub use switcher::{FallbackSwitcher, SwitcherMode, SwitcherSnapshot};
pub use transport::{HttpTransport, MulticallTransport};
