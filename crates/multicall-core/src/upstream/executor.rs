use crate::{
    config::ExecutorConfig,
    telemetry::{Telemetry, TelemetryEvent},
    types::{BatchResult, ChainId, MulticallPayload},
    upstream::{Endpoint, EndpointKind, EndpointPair, MulticallTransport, TransportError},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Everything needed to execute one flattened batch.
///
/// Plain data so it can be copied to the worker thread. The switcher is consulted on the
/// host before the job is built and only its decision travels with the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub chain_id: ChainId,
    pub payload: MulticallPayload,
    pub endpoints: EndpointPair,
    pub prefer_fallback: bool,
}

impl BatchJob {
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.payload.len()
    }
}

/// Outcome of [`BatchExecutor::call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub result: BatchResult,
    /// Endpoint that produced `result`, `None` if every attempt failed or nothing ran.
    pub served_by: Option<EndpointKind>,
    /// Whether an attempt against the primary endpoint failed. The host feeds this into the
    /// chain's fallback switcher.
    pub primary_failed: bool,
}

impl ExecutionReport {
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.served_by == Some(EndpointKind::Fallback)
    }
}

/// Runs a flattened batch against an endpoint pair with a bounded fallback.
///
/// ```text
///  selected endpoint ──race max_timeout──► ok ─────────────────────► success
///          │
///       fail/timeout
///          ▼
///  alternate endpoint ──race fallback_attempt_timeout──► ok ───────► success
///          │
///       fail/timeout ──────────────────────────────────────────────► total failure
/// ```
///
/// Exactly one retry per batch, with the same payload. The executor never touches the
/// switcher: a failed primary attempt is reported through a callback before the retry
/// starts, and the host records it.
pub struct BatchExecutor {
    transport: Arc<dyn MulticallTransport>,
    config: ExecutorConfig,
    telemetry: Telemetry,
}

impl BatchExecutor {
    #[must_use]
    pub fn new(
        transport: Arc<dyn MulticallTransport>,
        config: ExecutorConfig,
        telemetry: Telemetry,
    ) -> Self {
        Self { transport, config, telemetry }
    }

    /// Executes `job`, retrying once on the alternate endpoint.
    ///
    /// Never fails: a batch that no endpoint could serve comes back as
    /// [`BatchResult::total_failure`].
    pub async fn call(&self, job: &BatchJob) -> ExecutionReport {
        self.call_reporting(job, || {}).await
    }

    /// Same as [`call`](Self::call), invoking `on_primary_failure` as soon as an attempt
    /// against the primary endpoint fails, before any retry.
    pub async fn call_reporting<F>(&self, job: &BatchJob, on_primary_failure: F) -> ExecutionReport
    where
        F: FnOnce() + Send,
    {
        if job.payload.is_empty() {
            return ExecutionReport {
                result: BatchResult { success: true, ..BatchResult::default() },
                served_by: None,
                primary_failed: false,
            };
        }

        let config = &self.config;
        let mut on_primary_failure = Some(on_primary_failure);
        let (selected, alternate) = job.endpoints.select(job.prefer_fallback);

        let first_error = match self.attempt(job, selected, config.max_timeout()).await {
            Ok(result) => {
                return ExecutionReport {
                    result,
                    served_by: Some(selected.kind),
                    primary_failed: false,
                };
            }
            Err(e) => e,
        };

        let mut primary_failed = selected.kind == EndpointKind::Primary;
        if primary_failed {
            if let Some(report) = on_primary_failure.take() {
                report();
            }
        }

        warn!(
            chain_id = job.chain_id,
            endpoint = %selected.name,
            retry_endpoint = %alternate.name,
            error = %first_error,
            "multicall attempt failed, retrying on alternate endpoint"
        );

        match self.attempt(job, alternate, config.fallback_attempt_timeout()).await {
            Ok(result) => {
                ExecutionReport { result, served_by: Some(alternate.kind), primary_failed }
            }
            Err(second_error) => {
                if alternate.kind == EndpointKind::Primary {
                    primary_failed = true;
                    if let Some(report) = on_primary_failure.take() {
                        report();
                    }
                }
                let message = format!(
                    "multicall failed on {} ({first_error}) and {} ({second_error})",
                    selected.name, alternate.name
                );
                warn!(
                    chain_id = job.chain_id,
                    calls = job.call_count(),
                    error = %second_error,
                    "multicall failed on both endpoints"
                );
                ExecutionReport {
                    result: BatchResult::total_failure(&job.payload, &message),
                    served_by: None,
                    primary_failed,
                }
            }
        }
    }

    /// One time-boxed attempt against one endpoint.
    async fn attempt(
        &self,
        job: &BatchJob,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<BatchResult, TransportError> {
        let calls = &job.payload.calls;
        self.telemetry.emit(TelemetryEvent::Request {
            chain_id: job.chain_id,
            endpoint: endpoint.name.to_string(),
            calls: calls.len(),
        });

        let outcome = tokio::select! {
            result = self.transport.execute(endpoint, calls) => result,
            () = tokio::time::sleep(timeout) => Err(TransportError::Timeout),
        };

        let outcome = outcome.and_then(|outcomes| {
            if outcomes.len() == calls.len() {
                Ok(outcomes)
            } else {
                Err(TransportError::InvalidResponse(format!(
                    "expected {} outcomes, got {}",
                    calls.len(),
                    outcomes.len()
                )))
            }
        });

        match outcome {
            Ok(outcomes) => {
                debug!(
                    chain_id = job.chain_id,
                    endpoint = %endpoint.name,
                    calls = calls.len(),
                    "multicall attempt succeeded"
                );
                Ok(BatchResult::from_outcomes(&job.payload, outcomes))
            }
            Err(e) => {
                let event = if e.is_timeout() {
                    TelemetryEvent::Timeout {
                        chain_id: job.chain_id,
                        endpoint: endpoint.name.to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                } else {
                    TelemetryEvent::Error {
                        chain_id: job.chain_id,
                        endpoint: endpoint.name.to_string(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    }
                };
                self.telemetry.emit(event);
                Err(e)
            }
        }
    }
}
