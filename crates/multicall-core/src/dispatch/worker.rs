//! Batch execution on a dedicated worker thread.
//!
//! The worker owns a current-thread tokio runtime and its own [`BatchExecutor`]. Nothing
//! mutable is shared with the host: each request is a serialized [`BatchJob`] plus a
//! correlation id and private channels for the reply and for an early primary-failure
//! signal, and the response is a serialized [`ExecutionReport`]. Telemetry emitted inside
//! the worker travels back to the host sink over an `mpsc` channel drained by a host task.
//!
//! ```text
//! host                                  worker thread
//! ────                                  ─────────────
//! run(job) ──{id, json(job), reply}──► worker_loop ─► BatchExecutor::call_reporting
//!    ▲  ▲                                   │
//!    │  └───────── primary failed ──────────┤
//!    └──────────{id, json(report)}──────────┘
//! host sink ◄──── TelemetryEvent ────── ChannelSink
//! ```

use crate::{
    config::ExecutorConfig,
    telemetry::{ChannelSink, Telemetry, TelemetryEvent},
    upstream::{BatchExecutor, BatchJob, ExecutionReport, MulticallTransport},
};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{panic::AssertUnwindSafe, sync::Arc, thread};
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const WORKER_THREAD_NAME: &str = "multicall-worker";

/// Serializable error crossing the worker boundary.
///
/// Carries no live references: only a name, a message and an optional stack rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("worker {name}: {message}")]
pub struct WorkerError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl WorkerError {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into(), stack: None }
    }

    #[must_use]
    pub fn disconnected() -> Self {
        Self::new("disconnected", "worker thread is not running")
    }

    #[must_use]
    pub fn panic(message: impl Into<String>) -> Self {
        Self::new("panic", message)
    }

    #[must_use]
    pub fn serialization(error: &serde_json::Error) -> Self {
        Self::new("serialization", error.to_string())
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.name == "disconnected"
    }
}

struct WorkerRequest {
    id: Uuid,
    job: Vec<u8>,
    reply: oneshot::Sender<WorkerResponse>,
    primary_failed: oneshot::Sender<()>,
}

#[derive(Debug)]
struct WorkerResponse {
    id: Uuid,
    outcome: Result<Vec<u8>, WorkerError>,
}

/// Host-side handle to the worker thread.
pub struct WorkerBridge {
    tx: Mutex<Option<mpsc::UnboundedSender<WorkerRequest>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerBridge {
    /// Starts the worker thread and the host task forwarding its telemetry.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerError`] if there is no current runtime or the thread cannot be spawned.
    pub fn spawn(
        transport: Arc<dyn MulticallTransport>,
        config: ExecutorConfig,
        telemetry: Telemetry,
    ) -> Result<Self, WorkerError> {
        let host = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkerError::new("spawn", e.to_string()))?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let (tx, rx) = mpsc::unbounded_channel::<WorkerRequest>();

        let executor =
            Arc::new(BatchExecutor::new(transport, config, Arc::new(ChannelSink::new(event_tx))));

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime =
                    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            error!(error = %e, "failed to build worker runtime");
                            return;
                        }
                    };
                runtime.block_on(worker_loop(rx, executor));
            })
            .map_err(|e| WorkerError::new("spawn", e.to_string()))?;

        let forwarder = host.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                telemetry.emit(event);
            }
            debug!("worker telemetry forwarder stopped");
        });

        info!(thread = WORKER_THREAD_NAME, "multicall worker started");

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            forwarder: Mutex::new(Some(forwarder)),
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tx.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Executes `job` on the worker thread.
    ///
    /// `on_primary_failure` runs on the host as soon as the worker reports a failed primary
    /// attempt, before the worker's retry completes.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerError`] if the job cannot be serialized, the worker is gone, or the
    /// executor panicked.
    pub async fn run<F>(
        &self,
        job: &BatchJob,
        on_primary_failure: F,
    ) -> Result<ExecutionReport, WorkerError>
    where
        F: FnOnce() + Send,
    {
        let id = Uuid::new_v4();
        let payload = serde_json::to_vec(job).map_err(|e| WorkerError::serialization(&e))?;
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let (failed_tx, mut failed_rx) = oneshot::channel();

        {
            let tx = self.tx.lock();
            let tx = tx.as_ref().ok_or_else(WorkerError::disconnected)?;
            tx.send(WorkerRequest { id, job: payload, reply: reply_tx, primary_failed: failed_tx })
                .map_err(|_| WorkerError::disconnected())?;
        }

        let mut on_primary_failure = Some(on_primary_failure);
        let response = loop {
            tokio::select! {
                biased;
                signal = &mut failed_rx, if on_primary_failure.is_some() => {
                    let report = on_primary_failure.take();
                    if let (Ok(()), Some(report)) = (signal, report) {
                        report();
                    }
                }
                reply = &mut reply_rx => {
                    break reply.map_err(|_| WorkerError::disconnected())?;
                }
            }
        };
        if response.id != id {
            return Err(WorkerError::new(
                "correlation",
                format!("expected response {id}, got {}", response.id),
            ));
        }

        let bytes = response.outcome?;
        serde_json::from_slice(&bytes).map_err(|e| WorkerError::serialization(&e))
    }

    /// Stops accepting jobs, lets in-flight jobs finish and joins the thread.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        drop(tx);

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => debug!("worker thread joined"),
                Ok(Err(_)) => warn!("worker thread panicked during shutdown"),
                Err(e) => warn!(error = %e, "failed to join worker thread"),
            }
        }

        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            if let Err(e) = forwarder.await {
                warn!(error = %e, "worker telemetry forwarder failed");
            }
        }

        info!("multicall worker stopped");
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop; the thread detaches.
        self.tx.get_mut().take();
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<WorkerRequest>,
    executor: Arc<BatchExecutor>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else { break };
                in_flight.spawn(handle_request(request, Arc::clone(&executor)));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    while in_flight.join_next().await.is_some() {}
    debug!("worker loop drained");
}

async fn handle_request(request: WorkerRequest, executor: Arc<BatchExecutor>) {
    let WorkerRequest { id, job, reply, primary_failed } = request;

    let outcome = match serde_json::from_slice::<BatchJob>(&job) {
        Ok(job) => {
            debug!(
                %id,
                chain_id = job.chain_id,
                calls = job.call_count(),
                "worker executing batch"
            );
            let report_failure = move || {
                // The host may have stopped listening.
                let _ = primary_failed.send(());
            };
            match AssertUnwindSafe(executor.call_reporting(&job, report_failure))
                .catch_unwind()
                .await
            {
                Ok(report) => {
                    serde_json::to_vec(&report).map_err(|e| WorkerError::serialization(&e))
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "executor panicked".to_string());
                    error!(%id, message = %message, "worker executor panicked");
                    Err(WorkerError::panic(message))
                }
            }
        }
        Err(e) => Err(WorkerError::serialization(&e)),
    };

    if reply.send(WorkerResponse { id, outcome }).is_err() {
        debug!(%id, "worker reply dropped, caller went away");
    }
}
