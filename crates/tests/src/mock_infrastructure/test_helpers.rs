//! Test Helper Functions and Utilities
//!
//! Common helpers for building requests, configurations and engines.

use crate::mock_infrastructure::{MockTransport, RecordingSink};
use multicall_core::{
    config::{ChainConfig, MulticallConfig, SwitcherConfig},
    engine::MulticallEngine,
    types::{CallGroup, CallSpec, ChainId, MulticallRequest},
};
use serde_json::json;
use std::sync::Arc;

pub const ARBITRUM: ChainId = 42161;
pub const OPTIMISM: ChainId = 10;

pub const USDC: &str = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831";
pub const WETH: &str = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1";
pub const USER: &str = "0x00000000000000000000000000000000000000aa";

/// Configuration with Arbitrum and Optimism pairs pointing at unreachable hosts.
#[must_use]
pub fn test_config() -> MulticallConfig {
    MulticallConfig::default()
        .with_chain(ChainConfig::new(
            ARBITRUM,
            "arbitrum",
            "http://arbitrum-primary.invalid",
            "http://arbitrum-fallback.invalid",
        ))
        .with_chain(ChainConfig::new(
            OPTIMISM,
            "optimism",
            "http://optimism-primary.invalid",
            "http://optimism-fallback.invalid",
        ))
}

/// Same as [`test_config`] with a switcher that trips after `threshold` failures.
#[must_use]
pub fn config_with_threshold(threshold: usize) -> MulticallConfig {
    let mut config = test_config();
    config.switcher = SwitcherConfig { events_threshold: threshold, ..SwitcherConfig::default() };
    config
}

/// Builds an engine over `transport` reporting into `sink`.
///
/// # Panics
///
/// Panics if the engine cannot be built.
#[must_use]
pub fn test_engine(
    transport: Arc<MockTransport>,
    sink: Arc<RecordingSink>,
    worker: bool,
) -> MulticallEngine {
    engine_with_config(test_config(), transport, sink, worker)
}

/// # Panics
///
/// Panics if the engine cannot be built.
#[must_use]
pub fn engine_with_config(
    config: MulticallConfig,
    transport: Arc<MockTransport>,
    sink: Arc<RecordingSink>,
    worker: bool,
) -> MulticallEngine {
    let builder = MulticallEngine::builder()
        .with_config(config)
        .with_transport(transport)
        .with_telemetry(sink);
    let builder = if worker { builder.enable_worker() } else { builder.disable_worker() };
    builder.build().expect("engine should build")
}

/// `{group: {call: balanceOf(user)}}` on `token`.
#[must_use]
pub fn balance_request(group: &str, call: &str, token: &str, user: &str) -> MulticallRequest {
    MulticallRequest::new().group(
        group,
        CallGroup::new(token, json!([]))
            .call(call, CallSpec::new("balanceOf", vec![json!(user)])),
    )
}

/// One group of `count` distinct calls named `call_0..call_{count-1}`.
#[must_use]
pub fn wide_request(group: &str, count: usize) -> MulticallRequest {
    let group_calls = (0..count).fold(CallGroup::new(USDC, json!([])), |group, i| {
        let holder = json!(format!("0x{i:040x}"));
        group.call(format!("call_{i}"), CallSpec::new("balanceOf", vec![holder]))
    });
    MulticallRequest::new().group(group, group_calls)
}
