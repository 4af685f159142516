use crate::{
    config::WorkerConfig,
    dispatch::{WorkerBridge, WorkerError},
    telemetry::{Telemetry, TelemetryEvent},
    upstream::{BatchExecutor, BatchJob, ExecutionReport},
};
use std::sync::Arc;
use tracing::debug;

/// Where a batch executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// On the host runtime, next to the scheduler.
    MainThread,
    /// On the worker thread via [`WorkerBridge`].
    Worker,
}

/// Picks the execution target for a batch of `call_count` calls.
///
/// Small batches stay on the host where there is no serialization overhead; batches at or
/// above `offload_threshold` go to the worker when one is available.
#[must_use]
pub fn select_target(
    call_count: usize,
    config: &WorkerConfig,
    worker_available: bool,
) -> ExecutionTarget {
    if config.enabled && worker_available && call_count >= config.offload_threshold {
        ExecutionTarget::Worker
    } else {
        ExecutionTarget::MainThread
    }
}

/// Routes batches to the host executor or the worker.
///
/// Has no retry logic of its own: whatever the chosen executor reports is returned as is.
pub struct ExecutionRouter {
    local: Arc<BatchExecutor>,
    worker: Option<WorkerBridge>,
    config: WorkerConfig,
    telemetry: Telemetry,
}

impl ExecutionRouter {
    #[must_use]
    pub fn new(
        local: Arc<BatchExecutor>,
        worker: Option<WorkerBridge>,
        config: WorkerConfig,
        telemetry: Telemetry,
    ) -> Self {
        Self { local, worker, config, telemetry }
    }

    #[must_use]
    pub fn target_for(&self, job: &BatchJob) -> ExecutionTarget {
        let worker_available = self.worker.as_ref().is_some_and(WorkerBridge::is_running);
        select_target(job.call_count(), &self.config, worker_available)
    }

    /// Executes `job` on the target chosen by [`select_target`].
    ///
    /// `on_primary_failure` runs on the host, before the retry, if the primary endpoint fails.
    ///
    /// # Errors
    ///
    /// Returns the [`WorkerError`] if the job was offloaded and the worker failed.
    pub async fn run<F>(
        &self,
        job: &BatchJob,
        on_primary_failure: F,
    ) -> Result<ExecutionReport, WorkerError>
    where
        F: FnOnce() + Send,
    {
        match (self.target_for(job), &self.worker) {
            (ExecutionTarget::Worker, Some(worker)) => {
                debug!(
                    chain_id = job.chain_id,
                    calls = job.call_count(),
                    "offloading batch to worker"
                );
                self.telemetry.emit(TelemetryEvent::WorkerOffload {
                    chain_id: job.chain_id,
                    calls: job.call_count(),
                });
                worker.run(job, on_primary_failure).await
            }
            _ => Ok(self.local.call_reporting(job, on_primary_failure).await),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.shutdown().await;
        }
    }
}
