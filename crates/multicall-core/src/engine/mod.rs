//! The multicall engine: public entry point tying every component together.
//!
//! ```text
//! submit ─► Collector ─► Scheduler ─(window)─► flush_all ─► per chain: run_cycle
//!                                                              │
//!   PendingResult ◄── remap::expand ◄── ExecutionRouter ◄──────┘
//!                                            │
//!                                 host executor | worker thread
//! ```
//!
//! One engine is built per process and shared by handle. It owns the per-chain pending
//! stores and one [`FallbackSwitcher`] per chain; both live as long as the engine.

mod builder;

pub use builder::MulticallEngineBuilder;

use crate::{
    batching::{remap, Collector, FlushTarget, PendingStore, Scheduler},
    config::ChainConfig,
    dispatch::{ExecutionRouter, WorkerError},
    telemetry::{Telemetry, TelemetryEvent},
    types::{BatchResult, ChainId, MulticallRequest, MulticallResult, Priority},
    upstream::{BatchJob, EndpointPair, ExecutionReport, FallbackSwitcher, TransportError},
};
use ahash::AHashMap;
use futures_util::{future::BoxFuture, FutureExt};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Instant,
};
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

const DROPPED_CYCLE: &str = "multicall cycle dropped before completion";

/// Errors surfaced synchronously to the caller that caused them.
#[derive(Debug, Error)]
pub enum MulticallError {
    /// No endpoint pair is configured for the requested chain.
    #[error("No RPC endpoints configured for chain {0}")]
    UnknownChain(ChainId),

    /// The engine has been shut down.
    #[error("Multicall engine is shut down")]
    ShutDown,

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    Config(String),

    /// Building the default transport failed.
    #[error("Transport initialization failed: {0}")]
    Transport(#[from] TransportError),

    /// Starting the worker thread failed.
    #[error("Worker initialization failed: {0}")]
    Worker(#[from] WorkerError),

    /// The engine was built outside a tokio runtime.
    #[error("Multicall engine must be built inside a tokio runtime")]
    NoRuntime,
}

/// Process-lifetime state of one configured chain.
struct ChainRuntime {
    config: ChainConfig,
    endpoints: EndpointPair,
    switcher: Arc<FallbackSwitcher>,
}

/// State shared by the engine handle, the scheduler and in-flight cycles.
struct EngineInner {
    chains: AHashMap<ChainId, ChainRuntime>,
    collector: Collector,
    router: ExecutionRouter,
    telemetry: Telemetry,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl EngineInner {
    /// Executes one flushed store and resolves every hook in it.
    async fn run_cycle(self: Arc<Self>, chain_id: ChainId, mut store: PendingStore) {
        let started = Instant::now();
        let payload = store.to_payload();

        let report = match self.chains.get(&chain_id) {
            Some(chain) => {
                let job = BatchJob {
                    chain_id,
                    payload,
                    endpoints: chain.endpoints.clone(),
                    prefer_fallback: chain.switcher.is_fallback(),
                };
                debug!(
                    chain_id,
                    chain = %chain.config.name,
                    calls = job.call_count(),
                    waiting = store.hook_count(),
                    prefer_fallback = job.prefer_fallback,
                    "executing multicall cycle"
                );

                let switcher = Arc::clone(&chain.switcher);
                let on_primary_failure = move || {
                    switcher.record_failure();
                };

                match self.router.run(&job, on_primary_failure).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(chain_id, error = %e, "multicall worker failed");
                        ExecutionReport {
                            result: BatchResult::total_failure(&job.payload, &e.to_string()),
                            served_by: None,
                            primary_failed: false,
                        }
                    }
                }
            }
            None => ExecutionReport {
                result: BatchResult::total_failure(
                    &payload,
                    &MulticallError::UnknownChain(chain_id).to_string(),
                ),
                served_by: None,
                primary_failed: false,
            },
        };

        let resolved = remap::expand(&report.result, &mut store);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.telemetry.emit(TelemetryEvent::Batch {
            chain_id,
            calls: report.result.len(),
            success: report.result.success,
            used_fallback: report.used_fallback(),
            duration_ms,
        });
        debug!(
            chain_id,
            resolved,
            success = report.result.success,
            used_fallback = report.used_fallback(),
            duration_ms,
            "multicall cycle complete"
        );
    }

    fn cycle_finished(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Waits until no cycle is in flight.
    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl FlushTarget for EngineInner {
    fn flush_all(self: Arc<Self>) {
        for chain_id in self.collector.pending_chains() {
            let store = self.collector.take(chain_id);
            if store.is_empty() {
                continue;
            }

            self.in_flight.fetch_add(1, Ordering::AcqRel);
            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                let guard = CycleGuard(Arc::clone(&inner));
                inner.run_cycle(chain_id, store).await;
                drop(guard);
            });
        }
    }
}

/// Marks a cycle finished even if it panicked.
struct CycleGuard(Arc<EngineInner>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.cycle_finished();
    }
}

/// A caller's result, resolved once its scheduling cycle completes.
///
/// Never hangs and never fails: if the cycle is torn down before delivering, the future
/// resolves to a result in which every requested call carries an error.
pub struct PendingResult {
    inner: BoxFuture<'static, MulticallResult>,
}

impl PendingResult {
    fn ready(result: MulticallResult) -> Self {
        Self { inner: futures_util::future::ready(result).boxed() }
    }

    fn waiting(
        rx: tokio::sync::oneshot::Receiver<MulticallResult>,
        request: MulticallRequest,
    ) -> Self {
        Self {
            inner: async move {
                rx.await.unwrap_or_else(|_| {
                    warn!(calls = request.call_count(), "multicall result dropped");
                    MulticallResult::failed(&request, DROPPED_CYCLE)
                })
            }
            .boxed(),
        }
    }
}

impl Future for PendingResult {
    type Output = MulticallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// Batching and fallback engine for contract reads.
///
/// # Example
///
/// ```no_run
/// use multicall_core::{
///     config::{ChainConfig, MulticallConfig},
///     engine::MulticallEngine,
///     types::{CallGroup, CallSpec, MulticallRequest, Priority},
/// };
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MulticallConfig::default().with_chain(ChainConfig::new(
///     42161,
///     "arbitrum",
///     "https://arb1.arbitrum.io/rpc",
///     "https://arbitrum.example.com/rpc",
/// ));
/// let engine = MulticallEngine::builder().with_config(config).build()?;
///
/// let request = MulticallRequest::new().group(
///     "usdc",
///     CallGroup::new("0xaf88d065e77c8cC2239327C5EDb3A432268e5831", json!([]))
///         .call("supply", CallSpec::new("totalSupply", vec![])),
/// );
/// let result = engine.submit(42161, request, Priority::Urgent)?.await;
/// println!("{:?}", result.value("usdc", "supply"));
///
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MulticallEngine {
    inner: Arc<EngineInner>,
    scheduler: Scheduler,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_initiated: AtomicBool,
}

impl MulticallEngine {
    #[must_use]
    pub fn builder() -> MulticallEngineBuilder {
        MulticallEngineBuilder::new()
    }

    /// Registers `request` for the next cycle on `chain_id`.
    ///
    /// Identical calls already pending on the chain, from any caller, are shared rather than
    /// executed again. The returned future resolves when this caller's calls have resolved.
    ///
    /// # Errors
    ///
    /// - [`MulticallError::UnknownChain`] if the chain has no endpoint pair
    /// - [`MulticallError::ShutDown`] after [`shutdown`](Self::shutdown)
    pub fn submit(
        &self,
        chain_id: ChainId,
        request: MulticallRequest,
        priority: Priority,
    ) -> Result<PendingResult, MulticallError> {
        if self.shutdown_initiated.load(Ordering::Acquire) {
            return Err(MulticallError::ShutDown);
        }
        if !self.inner.chains.contains_key(&chain_id) {
            return Err(MulticallError::UnknownChain(chain_id));
        }
        if request.is_empty() {
            return Ok(PendingResult::ready(MulticallResult::empty()));
        }

        let rx = self.inner.collector.submit(chain_id, &request).ok_or(MulticallError::ShutDown)?;
        self.scheduler.schedule(priority);
        Ok(PendingResult::waiting(rx, request))
    }

    /// Flushes every chain now instead of waiting for a throttle window.
    pub fn flush_now(&self) {
        self.scheduler.flush_now();
    }

    /// The fallback switcher of `chain_id`.
    #[must_use]
    pub fn switcher(&self, chain_id: ChainId) -> Option<Arc<FallbackSwitcher>> {
        self.inner.chains.get(&chain_id).map(|c| Arc::clone(&c.switcher))
    }

    /// Unique calls waiting for the next cycle on `chain_id`.
    #[must_use]
    pub fn pending_calls(&self, chain_id: ChainId) -> usize {
        self.inner.collector.pending_calls(chain_id)
    }

    /// Chains this engine serves.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.inner.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Flushes pending work, waits for in-flight cycles, then stops the scheduler and worker.
    ///
    /// Idempotent. Submissions after this call fail with [`MulticallError::ShutDown`].
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating multicall engine shutdown");
        // Waits out submissions already registering, so the final flush below sees them.
        self.inner.collector.close();

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "failed to send shutdown signal (no receivers)");
        }
        self.scheduler.join().await;

        // The scheduler may already be gone; flush whatever it did not.
        Arc::clone(&self.inner).flush_all();
        self.inner.wait_idle().await;

        self.inner.router.shutdown().await;
        info!("multicall engine shutdown complete");
    }
}
