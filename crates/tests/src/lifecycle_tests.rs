//! Integration tests for engine construction, scheduling windows and shutdown.

use crate::mock_infrastructure::{
    balance_request, test_config, test_engine, MockTransport, RecordingSink, ARBITRUM, USDC, USER,
};
use futures_util::future::join_all;
use multicall_core::{
    config::MulticallConfig,
    engine::{MulticallEngine, MulticallError},
    types::{MulticallRequest, Priority},
};
use std::{sync::Arc, thread, time::Duration};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_urgent_and_background_windows() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let started = Instant::now();
    engine
        .submit(ARBITRUM, balance_request("g", "c", USDC, "0x01"), Priority::Urgent)
        .unwrap()
        .await;
    let urgent = started.elapsed();
    assert!(urgent >= Duration::from_millis(50) && urgent < Duration::from_millis(100));

    let started = Instant::now();
    engine
        .submit(ARBITRUM, balance_request("g", "c", USDC, "0x02"), Priority::Background)
        .unwrap()
        .await;
    let background = started.elapsed();
    assert!(background >= Duration::from_millis(1_000));
    assert!(background < Duration::from_millis(1_050));

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_background_calls_ride_an_urgent_flush() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let background = engine
        .submit(ARBITRUM, balance_request("a", "b", USDC, "0x01"), Priority::Background)
        .unwrap();
    let urgent = engine
        .submit(ARBITRUM, balance_request("c", "d", USDC, "0x02"), Priority::Urgent)
        .unwrap();

    let started = Instant::now();
    let (background, urgent) = tokio::join!(background, urgent);
    assert!(background.success && urgent.success);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(transport.recorded().len(), 1);
    assert_eq!(transport.recorded()[0].len(), 2);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_and_rejects() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), false);

    let pending = engine
        .submit(ARBITRUM, balance_request("g", "c", USDC, USER), Priority::Background)
        .unwrap();
    engine.shutdown().await;
    assert_eq!(transport.recorded().len(), 1);

    let result = pending.await;
    assert!(result.success);

    assert!(matches!(
        engine.submit(ARBITRUM, balance_request("g", "c", USDC, USER), Priority::Urgent),
        Err(MulticallError::ShutDown)
    ));
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submissions_racing_shutdown_all_settle() {
    for round in 0..50 {
        let transport = MockTransport::new();
        let engine = Arc::new(test_engine(transport.clone(), RecordingSink::new(), false));

        let submitter = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut accepted = Vec::new();
                for i in 0..400u32 {
                    let request = balance_request("g", "c", USDC, &format!("0x{i:040x}"));
                    match engine.submit(ARBITRUM, request, Priority::Urgent) {
                        Ok(pending) => accepted.push(pending),
                        Err(MulticallError::ShutDown) => break,
                        Err(e) => panic!("unexpected submit error: {e}"),
                    }
                    if i % 16 == 0 {
                        engine.flush_now();
                    }
                }
                accepted
            })
        };

        tokio::task::yield_now().await;
        engine.shutdown().await;
        let accepted = tokio::task::spawn_blocking(move || submitter.join())
            .await
            .unwrap()
            .expect("submitter thread panicked");

        let accepted_count = accepted.len();
        let results = tokio::time::timeout(Duration::from_secs(3), join_all(accepted))
            .await
            .unwrap_or_else(|_| {
                panic!("round {round}: {accepted_count} accepted, some never settled")
            });
        assert!(results.iter().all(|r| r.success), "round {round}: a result failed");

        let executed: usize = transport.recorded().iter().map(|batch| batch.len()).sum();
        assert_eq!(executed, accepted_count, "round {round}: accepted calls not executed");
    }
}

#[tokio::test]
async fn test_shutdown_stops_worker() {
    let engine = test_engine(MockTransport::new(), RecordingSink::new(), true);
    let result = engine
        .submit(ARBITRUM, balance_request("g", "c", USDC, USER), Priority::Urgent)
        .unwrap()
        .await;
    assert!(result.success);

    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .expect("shutdown should join the worker");
}

#[tokio::test]
async fn test_submit_validation() {
    let engine = test_engine(MockTransport::new(), RecordingSink::new(), false);

    assert!(matches!(
        engine.submit(1, balance_request("g", "c", USDC, USER), Priority::Urgent),
        Err(MulticallError::UnknownChain(1))
    ));

    let empty = engine.submit(ARBITRUM, MulticallRequest::new(), Priority::Urgent).unwrap().await;
    assert!(empty.success);
    assert!(empty.errors.is_empty() && empty.data.is_empty());
    assert_eq!(engine.chain_ids(), vec![10, ARBITRUM]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let result = MulticallEngine::builder().with_config(MulticallConfig::default()).build();
    assert!(matches!(result, Err(MulticallError::Config(_))));

    let mut config = test_config();
    config.chains[0].primary_rpc_url = "ws://not-http".to_string();
    let result = MulticallEngine::builder()
        .with_config(config)
        .with_transport(MockTransport::new())
        .build();
    assert!(matches!(result, Err(MulticallError::Config(_))));
}
