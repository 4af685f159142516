//! Integration tests for offloading large batches to the worker thread.
//!
//! These run in real time: the worker owns its own runtime on a separate OS thread, which a
//! paused host clock cannot drive.

use crate::mock_infrastructure::{
    test_engine, wide_request, MockTransport, RecordingSink, ARBITRUM,
};
use multicall_core::types::Priority;

const WORKER_THREAD: &str = "multicall-worker";

#[tokio::test]
async fn test_large_batch_runs_on_worker_small_batch_on_host() {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let engine = test_engine(transport.clone(), sink.clone(), true);

    let bulk = engine.submit(ARBITRUM, wide_request("bulk", 500), Priority::Urgent).unwrap().await;
    assert!(bulk.success);
    assert_eq!(bulk.data["bulk"].len(), 500);
    assert_eq!(bulk.error_count(), 0);

    let small = engine.submit(ARBITRUM, wide_request("small", 3), Priority::Urgent).unwrap().await;
    assert!(small.success);
    assert_eq!(small.data["small"].len(), 3);

    let recorded = transport.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].len(), 500);
    assert_eq!(recorded[0].thread.as_deref(), Some(WORKER_THREAD));
    assert_eq!(recorded[1].len(), 3);
    assert_ne!(recorded[1].thread.as_deref(), Some(WORKER_THREAD));

    engine.shutdown().await;

    // Worker telemetry reaches the host sink once the forwarder has drained.
    assert_eq!(sink.count("multicall.worker.offload"), 1);
    assert_eq!(sink.count("multicall.request"), 2);
    assert_eq!(sink.count("multicall.batch"), 2);
}

#[tokio::test]
async fn test_disabled_worker_keeps_everything_on_host() {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let engine = test_engine(transport.clone(), sink.clone(), false);

    let bulk = engine.submit(ARBITRUM, wide_request("bulk", 500), Priority::Urgent).unwrap().await;
    assert!(bulk.success);

    let recorded = transport.recorded();
    assert_eq!(recorded.len(), 1);
    assert_ne!(recorded[0].thread.as_deref(), Some(WORKER_THREAD));
    assert_eq!(sink.count("multicall.worker.offload"), 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_threshold_counts_unique_calls() {
    let transport = MockTransport::new();
    let engine = test_engine(transport.clone(), RecordingSink::new(), true);

    // Twenty callers asking for the same five reads make a five-call batch.
    let pending: Vec<_> = (0..20)
        .map(|i| {
            engine
                .submit(ARBITRUM, wide_request(&format!("w{i}"), 5), Priority::Urgent)
                .unwrap()
        })
        .collect();
    for result in futures_util::future::join_all(pending).await {
        assert!(result.success);
    }

    let recorded = transport.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].len(), 5);
    assert_ne!(recorded[0].thread.as_deref(), Some(WORKER_THREAD));

    engine.shutdown().await;
}
