//! Mock Infrastructure for Testing the Multicall Engine
//!
//! Reusable mock types for exercising the engine without real RPC endpoints.
//!
//! ## Components
//!
//! - `MockTransport`: in-process [`MulticallTransport`] with per-endpoint scripted behavior
//!   (succeed, fail, hang, delay) and per-method reverts; records every physical multicall
//! - `RecordingSink`: telemetry sink that keeps every event for assertions
//! - `RpcMockBuilder`: wraps mockito to serve JSON-RPC batch responses to `HttpTransport`
//! - Test helpers for common requests and engine configurations
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{MockTransport, RecordingSink, test_engine};
//!
//! let transport = MockTransport::new();
//! let sink = RecordingSink::new();
//! let engine = test_engine(transport.clone(), sink.clone(), false);
//! ```
//!
//! [`MulticallTransport`]: multicall_core::upstream::MulticallTransport

pub mod mock_transport;
pub mod rpc_mock;
pub mod test_helpers;

pub use mock_transport::{EndpointBehavior, MockTransport, RecordedMulticall};
pub use recording_sink::RecordingSink;
pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
