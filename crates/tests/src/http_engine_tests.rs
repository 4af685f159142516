//! End-to-end tests through the default HTTP transport against mockito endpoints.

use crate::mock_infrastructure::{
    rpc_mock::{ok, reverted},
    RecordingSink, RpcMockBuilder, ARBITRUM, USDC, USER,
};
use multicall_core::{
    config::{ChainConfig, MulticallConfig},
    engine::MulticallEngine,
    types::{CallGroup, CallSpec, MulticallRequest, Priority},
};
use serde_json::json;
use std::sync::Arc;

fn engine(primary: &str, fallback: &str, sink: Arc<RecordingSink>) -> MulticallEngine {
    let config = MulticallConfig::default()
        .with_chain(ChainConfig::new(ARBITRUM, "arbitrum", primary, fallback));
    MulticallEngine::builder()
        .with_config(config)
        .with_telemetry(sink)
        .disable_worker()
        .build()
        .unwrap()
}

fn token_request() -> MulticallRequest {
    MulticallRequest::new().group(
        "usdc",
        CallGroup::new(USDC, json!([]))
            .call("balance", CallSpec::new("balanceOf", vec![json!(USER)]))
            .call("decimals", CallSpec::new("decimals", vec![])),
    )
}

#[tokio::test]
async fn test_http_primary_serves_batch_with_revert() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_batch("balanceOf", &[ok(json!("0x64")), reverted("execution reverted")]).await;
    let fallback = RpcMockBuilder::new().await;

    let engine = engine(&primary.url(), &fallback.url(), RecordingSink::new());
    let result = engine.submit(ARBITRUM, token_request(), Priority::Urgent).unwrap().await;

    assert!(result.success);
    assert_eq!(result.value("usdc", "balance"), Some(&json!("0x64")));
    assert_eq!(result.error("usdc", "decimals"), Some("execution reverted"));
    primary.assert_all();

    engine.shutdown().await;
}

#[tokio::test]
async fn test_http_primary_outage_falls_back() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_status(503).await;
    let mut fallback = RpcMockBuilder::new().await;
    fallback.mock_batch("balanceOf", &[ok(json!("0x64")), ok(json!("0x06"))]).await;

    let sink = RecordingSink::new();
    let engine = engine(&primary.url(), &fallback.url(), sink.clone());
    let result = engine.submit(ARBITRUM, token_request(), Priority::Urgent).unwrap().await;

    assert!(result.success);
    assert_eq!(result.value("usdc", "balance"), Some(&json!("0x64")));
    assert_eq!(result.value("usdc", "decimals"), Some(&json!("0x06")));
    assert_eq!(sink.count("multicall.error"), 1);
    assert_eq!(engine.switcher(ARBITRUM).unwrap().snapshot().recent_failures, 1);
    primary.assert_all();
    fallback.assert_all();

    engine.shutdown().await;
}
