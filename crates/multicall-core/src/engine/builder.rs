//! Builder pattern for initializing the multicall engine with configurable components.

use super::{ChainRuntime, EngineInner, MulticallEngine, MulticallError};
use crate::{
    batching::{Collector, FlushTarget, Scheduler},
    config::MulticallConfig,
    dispatch::{ExecutionRouter, WorkerBridge},
    telemetry::{NoopSink, Telemetry},
    upstream::{BatchExecutor, FallbackSwitcher, HttpTransport, MulticallTransport},
};
use ahash::AHashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize},
    Arc,
};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

#[derive(Clone)]
struct EngineOptions {
    enable_worker: Option<bool>,
    shutdown_channel_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { enable_worker: None, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`MulticallEngine`].
///
/// # Examples
///
/// ```no_run
/// # use multicall_core::{config::MulticallConfig, engine::MulticallEngineBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MulticallConfig::load()?;
///
/// let engine = MulticallEngineBuilder::new()
///     .with_config(config)
///     .disable_worker()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MulticallEngineBuilder {
    config: Option<MulticallConfig>,
    transport: Option<Arc<dyn MulticallTransport>>,
    telemetry: Option<Telemetry>,
    options: EngineOptions,
}

impl MulticallEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, transport: None, telemetry: None, options: EngineOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: MulticallConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the default [`HttpTransport`].
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MulticallTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the telemetry sink (default: [`NoopSink`]).
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Offloads large batches to a dedicated worker thread, overriding `worker.enabled`.
    #[must_use]
    pub fn enable_worker(mut self) -> Self {
        self.options.enable_worker = Some(true);
        self
    }

    #[must_use]
    pub fn disable_worker(mut self) -> Self {
        self.options.enable_worker = Some(false);
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity.max(1);
        self
    }

    /// Builds the engine and starts its scheduler and, if enabled, its worker.
    ///
    /// # Errors
    ///
    /// Returns [`MulticallError`] if configuration is missing or invalid, if called outside a
    /// tokio runtime, or if the transport or worker cannot be initialized.
    pub fn build(self) -> Result<MulticallEngine, MulticallError> {
        let mut config = self
            .config
            .ok_or_else(|| MulticallError::Config("No configuration provided".to_string()))?;
        config.validate().map_err(MulticallError::Config)?;

        if let Some(enabled) = self.options.enable_worker {
            config.worker.enabled = enabled;
        }

        tokio::runtime::Handle::try_current().map_err(|_| MulticallError::NoRuntime)?;

        info!(
            chains = config.chains.len(),
            worker_enabled = config.worker.enabled,
            offload_threshold = config.worker.offload_threshold,
            urgent_window_ms = config.scheduler.urgent_window_ms,
            background_window_ms = config.scheduler.background_window_ms,
            "initializing multicall engine"
        );

        let telemetry = self.telemetry.unwrap_or_else(|| Arc::new(NoopSink));
        let transport: Arc<dyn MulticallTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.transport.clone())?),
        };

        let local = Arc::new(BatchExecutor::new(
            Arc::clone(&transport),
            config.executor.clone(),
            Arc::clone(&telemetry),
        ));
        debug!("host batch executor initialized");

        let worker = if config.worker.enabled {
            let bridge = WorkerBridge::spawn(
                Arc::clone(&transport),
                config.executor.clone(),
                Arc::clone(&telemetry),
            )?;
            debug!("worker bridge initialized");
            Some(bridge)
        } else {
            None
        };

        let router =
            ExecutionRouter::new(local, worker, config.worker.clone(), Arc::clone(&telemetry));

        let chains: AHashMap<_, _> = config
            .chains
            .iter()
            .map(|chain| {
                let switcher = Arc::new(FallbackSwitcher::new(
                    chain.chain_id,
                    config.switcher_for(chain),
                    Arc::clone(&telemetry),
                ));
                debug!(chain_id = chain.chain_id, chain = %chain.name, "chain registered");
                (
                    chain.chain_id,
                    ChainRuntime { config: chain.clone(), endpoints: chain.endpoints(), switcher },
                )
            })
            .collect();

        let inner = Arc::new(EngineInner {
            chains,
            collector: Collector::new(),
            router,
            telemetry,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) =
            broadcast::channel::<()>(self.options.shutdown_channel_capacity);
        let target: Arc<dyn FlushTarget> = Arc::clone(&inner) as Arc<dyn FlushTarget>;
        let scheduler =
            Scheduler::start(config.scheduler.clone(), Arc::downgrade(&target), shutdown_rx);

        info!("multicall engine initialized");

        Ok(MulticallEngine {
            inner,
            scheduler,
            shutdown_tx,
            shutdown_initiated: AtomicBool::new(false),
        })
    }
}

impl Default for MulticallEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
