//! Trailing-edge throttled flushing.
//!
//! Two independent throttles, urgent and background. A signal arms its throttle's deadline
//! only if it is not armed already, so a burst of signals collapses into one flush at the end
//! of the window. Whichever deadline passes first flushes every chain and disarms both.
//!
//! ```text
//! schedule(Urgent)      ──► urgent deadline     = now + urgent_window     (if unarmed)
//! schedule(Background)  ──► background deadline = now + background_window (if unarmed)
//! earliest deadline     ──► flush_all(), both deadlines cleared
//! shutdown              ──► flush_all(), task exits
//! ```

use crate::{config::SchedulerConfig, types::Priority};
use parking_lot::Mutex;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, trace};

/// Something the scheduler flushes.
pub trait FlushTarget: Send + Sync + 'static {
    /// Flushes every chain's pending store.
    fn flush_all(self: Arc<Self>);
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Schedule(Priority),
    FlushNow,
}

/// Handle to the scheduler task.
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawns the scheduler task on the current runtime.
    ///
    /// The task holds `target` weakly and stops once it is gone, once every handle is
    /// dropped, or on the shutdown signal.
    pub fn start(
        config: SchedulerConfig,
        target: Weak<dyn FlushTarget>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, target, rx, shutdown_rx));
        Self { tx, task: Mutex::new(Some(task)) }
    }

    /// Requests a flush within the window of `priority`.
    pub fn schedule(&self, priority: Priority) {
        if self.tx.send(Command::Schedule(priority)).is_err() {
            trace!(?priority, "scheduler stopped, ignoring schedule request");
        }
    }

    /// Flushes everything now and disarms both throttles.
    pub fn flush_now(&self) {
        if self.tx.send(Command::FlushNow).is_err() {
            trace!("scheduler stopped, ignoring flush request");
        }
    }

    /// Waits for the task to exit. The shutdown signal must have been sent first.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "scheduler task failed");
            }
        }
    }
}

/// Earliest armed deadline.
fn next_deadline(urgent: Option<Instant>, background: Option<Instant>) -> Option<Instant> {
    match (urgent, background) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn flush(target: &Weak<dyn FlushTarget>) -> bool {
    match target.upgrade() {
        Some(target) => {
            target.flush_all();
            true
        }
        None => false,
    }
}

async fn run(
    config: SchedulerConfig,
    target: Weak<dyn FlushTarget>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut urgent: Option<Instant> = None;
    let mut background: Option<Instant> = None;

    debug!(
        urgent_window_ms = config.urgent_window_ms,
        background_window_ms = config.background_window_ms,
        "multicall scheduler started"
    );

    loop {
        let deadline = next_deadline(urgent, background);
        let sleep_target =
            deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!("scheduler received shutdown signal, flushing pending calls");
                flush(&target);
                break;
            }

            command = rx.recv() => {
                match command {
                    Some(Command::Schedule(Priority::Urgent)) => {
                        urgent.get_or_insert_with(|| Instant::now() + config.urgent_window());
                    }
                    Some(Command::Schedule(Priority::Background)) => {
                        background
                            .get_or_insert_with(|| Instant::now() + config.background_window());
                    }
                    Some(Command::FlushNow) => {
                        urgent = None;
                        background = None;
                        if !flush(&target) {
                            break;
                        }
                    }
                    None => break,
                }
            }

            () = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                trace!(
                    urgent = urgent.is_some(),
                    background = background.is_some(),
                    "throttle window elapsed"
                );
                urgent = None;
                background = None;
                if !flush(&target) {
                    break;
                }
            }
        }
    }

    debug!("multicall scheduler stopped");
}
