//! # Telemetry
//!
//! The engine reports what it does as typed [`TelemetryEvent`]s handed to a
//! [`TelemetrySink`]. Sinks are a best-effort side channel: `emit` cannot fail from the
//! engine's point of view and a sink must never block the calling task.
//!
//! ## Sinks
//!
//! | Sink | Use |
//! |------|-----|
//! | [`MetricsSink`] | Records events with the `metrics` facade (Prometheus counters/histograms) |
//! | [`ChannelSink`] | Forwards events over a channel; used inside the worker thread |
//! | [`NoopSink`] | Discards everything |
//!
//! ## Event Names
//!
//! `multicall.request`, `multicall.timeout`, `multicall.error`, `multicall.fallback.on`,
//! `multicall.fallback.off`, `multicall.batch`, `multicall.worker.offload`.

use crate::types::ChainId;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Something the engine did that observers may care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A physical multicall was issued against an endpoint.
    Request { chain_id: ChainId, endpoint: String, calls: usize },
    /// An attempt lost its race against the timeout.
    Timeout { chain_id: ChainId, endpoint: String, timeout_ms: u64 },
    /// An attempt failed for a reason other than the timeout.
    Error { chain_id: ChainId, endpoint: String, kind: String, message: String },
    /// The switcher tripped into fallback mode.
    FallbackOn { chain_id: ChainId, failures: usize },
    /// The switcher restored the primary endpoint.
    FallbackOff { chain_id: ChainId },
    /// A scheduling cycle finished executing.
    Batch { chain_id: ChainId, calls: usize, success: bool, used_fallback: bool, duration_ms: u64 },
    /// A batch was shipped to the worker thread.
    WorkerOffload { chain_id: ChainId, calls: usize },
}

impl TelemetryEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "multicall.request",
            Self::Timeout { .. } => "multicall.timeout",
            Self::Error { .. } => "multicall.error",
            Self::FallbackOn { .. } => "multicall.fallback.on",
            Self::FallbackOff { .. } => "multicall.fallback.off",
            Self::Batch { .. } => "multicall.batch",
            Self::WorkerOffload { .. } => "multicall.worker.offload",
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        match self {
            Self::Request { chain_id, .. } |
            Self::Timeout { chain_id, .. } |
            Self::Error { chain_id, .. } |
            Self::FallbackOn { chain_id, .. } |
            Self::FallbackOff { chain_id } |
            Self::Batch { chain_id, .. } |
            Self::WorkerOffload { chain_id, .. } => *chain_id,
        }
    }
}

/// Receiver of telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Shared handle to a sink.
pub type Telemetry = Arc<dyn TelemetrySink>;

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Forwards events into an unbounded channel.
///
/// A closed receiver silently drops events.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelSink {
    fn emit(&self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("telemetry channel closed, dropping event");
        }
    }
}

/// Records events through the `metrics` facade.
///
/// Counters are labelled with the chain id; batch durations go into a histogram.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl MetricsSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Installs (once per process) a Prometheus recorder and returns its handle.
    ///
    /// Falls back to a local recorder if another global recorder is already installed.
    #[must_use]
    pub fn install_prometheus() -> PrometheusHandle {
        PROMETHEUS_HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "failed to install prometheus recorder, using a local recorder"
                    );
                    PrometheusBuilder::new().build_recorder().handle()
                }
            })
            .clone()
    }
}

impl TelemetrySink for MetricsSink {
    fn emit(&self, event: TelemetryEvent) {
        let chain = event.chain_id().to_string();
        match &event {
            TelemetryEvent::Request { calls, .. } => {
                counter!("multicall_requests_total", "chain_id" => chain.clone()).increment(1);
                #[allow(clippy::cast_precision_loss)]
                histogram!("multicall_request_calls", "chain_id" => chain).record(*calls as f64);
            }
            TelemetryEvent::Timeout { .. } => {
                counter!("multicall_timeouts_total", "chain_id" => chain).increment(1);
            }
            TelemetryEvent::Error { kind, .. } => {
                counter!("multicall_errors_total", "chain_id" => chain, "kind" => kind.clone())
                    .increment(1);
            }
            TelemetryEvent::FallbackOn { .. } => {
                counter!("multicall_fallback_on_total", "chain_id" => chain.clone()).increment(1);
                gauge!("multicall_fallback_mode", "chain_id" => chain).set(1.0);
            }
            TelemetryEvent::FallbackOff { .. } => {
                counter!("multicall_fallback_off_total", "chain_id" => chain.clone()).increment(1);
                gauge!("multicall_fallback_mode", "chain_id" => chain).set(0.0);
            }
            TelemetryEvent::Batch { success, duration_ms, .. } => {
                let outcome = if *success { "success" } else { "failure" };
                counter!(
                    "multicall_batches_total",
                    "chain_id" => chain.clone(),
                    "outcome" => outcome
                )
                .increment(1);
                #[allow(clippy::cast_precision_loss)]
                histogram!("multicall_batch_duration_seconds", "chain_id" => chain)
                    .record(*duration_ms as f64 / 1000.0);
            }
            TelemetryEvent::WorkerOffload { .. } => {
                counter!("multicall_worker_offloads_total", "chain_id" => chain).increment(1);
            }
        }
    }
}
