//! Integration tests for request collection and deduplication.
//!
//! - Identical reads from independent callers share one physical call
//! - Chains never share pending stores
//! - Every caller's future resolves, whatever happens to the batch

use crate::mock_infrastructure::{
    balance_request, test_engine, EndpointBehavior, MockTransport, RecordingSink, ARBITRUM,
    OPTIMISM, USDC, USER, WETH,
};
use multicall_core::{
    types::{CallGroup, CallSpec, MulticallRequest, Priority},
    upstream::EndpointKind,
};
use futures_util::future::join_all;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

#[tokio::test(start_paused = true)]
async fn test_two_widgets_share_one_balance_call() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let portfolio = engine
        .submit(ARBITRUM, balance_request("portfolio", "usdc", USDC, USER), Priority::Urgent)
        .unwrap();
    let header = engine
        .submit(ARBITRUM, balance_request("header", "balance", USDC, USER), Priority::Urgent)
        .unwrap();

    let (portfolio, header) = tokio::join!(portfolio, header);

    let recorded = transport.recorded();
    assert_eq!(recorded.len(), 1, "one physical multicall per cycle");
    assert_eq!(recorded[0].methods, vec!["balanceOf".to_string()]);

    let expected = MockTransport::value_for("balanceOf", &[json!(USER)]);
    assert_eq!(portfolio.value("portfolio", "usdc"), Some(&expected));
    assert_eq!(header.value("header", "balance"), Some(&expected));
    assert!(portfolio.success && header.success);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_results_keep_each_callers_shape() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let dashboard = MulticallRequest::new()
        .group(
            "usdc",
            CallGroup::new(USDC, json!([]))
                .call("balance", CallSpec::new("balanceOf", vec![json!(USER)]))
                .call("supply", CallSpec::new("totalSupply", vec![])),
        )
        .group(
            "weth",
            CallGroup::new(WETH, json!([]))
                .call("balance", CallSpec::new("balanceOf", vec![json!(USER)])),
        );
    let ticker = MulticallRequest::new().group(
        "t",
        CallGroup::new(USDC.to_lowercase(), json!([]))
            .call("s", CallSpec::new("totalSupply", vec![])),
    );

    let a = engine.submit(ARBITRUM, dashboard, Priority::Urgent).unwrap();
    let b = engine.submit(ARBITRUM, ticker, Priority::Urgent).unwrap();
    assert_eq!(engine.pending_calls(ARBITRUM), 3);

    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.data.len(), 2);
    assert_eq!(a.data["usdc"].len(), 2);
    assert_eq!(a.data["weth"].len(), 1);
    assert_eq!(b.data.len(), 1);
    assert_eq!(
        a.value("usdc", "supply"),
        b.value("t", "s"),
        "checksummed and lowercase addresses share one identity"
    );
    assert_eq!(transport.recorded()[0].len(), 3);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_chains_are_batched_separately() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let arb = engine
        .submit(ARBITRUM, balance_request("g", "c", USDC, USER), Priority::Urgent)
        .unwrap();
    let op = engine
        .submit(OPTIMISM, balance_request("g", "c", USDC, USER), Priority::Urgent)
        .unwrap();
    let (arb, op) = tokio::join!(arb, op);

    assert!(arb.success && op.success);
    assert_eq!(transport.recorded().len(), 2);
    assert_eq!(transport.multicalls_to(EndpointKind::Primary), 2);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_every_caller_resolves_when_all_endpoints_fail() {
    let transport = MockTransport::new();
    transport.set_primary(EndpointBehavior::Fail);
    transport.set_fallback(EndpointBehavior::Fail);
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let pending: Vec<_> = (0..5)
        .map(|i| {
            let user = format!("0x{i:040x}");
            engine
                .submit(ARBITRUM, balance_request("g", "c", USDC, &user), Priority::Urgent)
                .unwrap()
        })
        .collect();

    for result in join_all(pending).await {
        assert!(!result.success);
        assert_eq!(result.error_count(), 1);
        assert!(result.error("g", "c").is_some());
        assert!(!result.data["g"]["c"].success);
    }

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_affect_others() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let dropped = engine
        .submit(ARBITRUM, balance_request("a", "b", USDC, USER), Priority::Urgent)
        .unwrap();
    let kept = engine
        .submit(ARBITRUM, balance_request("x", "y", USDC, USER), Priority::Urgent)
        .unwrap();
    drop(dropped);

    let kept = kept.await;
    assert!(kept.success);
    assert!(kept.value("x", "y").is_some());

    engine.shutdown().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_unique_calls_per_cycle(users in prop::collection::vec(0u8..8, 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        let (physical, resolved) = runtime.block_on(async {
            let transport = MockTransport::new();
            let engine = test_engine(transport.clone(), RecordingSink::new(), false);

            let pending: Vec<_> = users
                .iter()
                .enumerate()
                .map(|(i, user)| {
                    let user = format!("0x{user:040x}");
                    let request = balance_request(&format!("widget_{i}"), "balance", USDC, &user);
                    engine.submit(ARBITRUM, request, Priority::Urgent).unwrap()
                })
                .collect();

            let results = join_all(pending).await;
            engine.shutdown().await;

            let physical: usize = transport.recorded().iter().map(|r| r.len()).sum();
            let resolved = results.iter().filter(|r| r.success).count();
            (physical, resolved)
        });

        let distinct: HashSet<_> = users.iter().collect();
        prop_assert_eq!(physical, distinct.len());
        prop_assert_eq!(resolved, users.len());
    }
}
