//! Engine configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `default_*` functions and `Default` implementations
//! 2. **Config file**: TOML file named by the `MULTICALL_CONFIG` env var
//! 3. **Environment variables**: `MULTICALL__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ChainConfig`]: primary/fallback RPC URLs and transport batch size per chain
//! - [`SchedulerConfig`]: urgent and background throttle windows
//! - [`ExecutorConfig`]: attempt timeouts
//! - [`WorkerConfig`]: worker offload threshold
//! - [`SwitcherConfig`]: fallback circuit breaker thresholds
//! - [`TransportConfig`]: HTTP concurrency limits
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! urgent_window_ms = 50
//! background_window_ms = 1000
//!
//! [[chains]]
//! chain_id = 42161
//! name = "arbitrum"
//! primary_rpc_url = "https://arb1.arbitrum.io/rpc"
//! fallback_rpc_url = "https://arbitrum.example.com/rpc"
//!
//! [switcher]
//! events_threshold = 3
//! fallback_timeout_ms = 60000
//! restore_timeout_ms = 300000
//! ```

use crate::{
    types::ChainId,
    upstream::{EndpointPair, DEFAULT_MAX_BATCH_SIZE},
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};

/// One chain and its endpoint pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,

    /// Human-readable name used for endpoint names in logs and telemetry.
    pub name: String,

    pub primary_rpc_url: String,

    pub fallback_rpc_url: String,

    /// Largest number of calls put into one JSON-RPC batch. Defaults to `256`.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Per-chain override of the global [`SwitcherConfig`].
    #[serde(default)]
    pub switcher: Option<SwitcherConfig>,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl ChainConfig {
    #[must_use]
    pub fn new(
        chain_id: ChainId,
        name: impl Into<String>,
        primary_rpc_url: impl Into<String>,
        fallback_rpc_url: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            name: name.into(),
            primary_rpc_url: primary_rpc_url.into(),
            fallback_rpc_url: fallback_rpc_url.into(),
            max_batch_size: default_max_batch_size(),
            switcher: None,
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> EndpointPair {
        EndpointPair::new(&self.name, &self.primary_rpc_url, &self.fallback_rpc_url)
            .with_max_batch_size(self.max_batch_size)
    }
}

/// Throttle windows of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Window for latency-sensitive callers. Defaults to `50`.
    #[serde(default = "default_urgent_window_ms")]
    pub urgent_window_ms: u64,

    /// Window for periodic refreshes. Defaults to `1000`.
    #[serde(default = "default_background_window_ms")]
    pub background_window_ms: u64,
}

fn default_urgent_window_ms() -> u64 {
    50
}

fn default_background_window_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            urgent_window_ms: default_urgent_window_ms(),
            background_window_ms: default_background_window_ms(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn urgent_window(&self) -> Duration {
        Duration::from_millis(self.urgent_window_ms)
    }

    #[must_use]
    pub fn background_window(&self) -> Duration {
        Duration::from_millis(self.background_window_ms)
    }
}

/// Time boxes of the batched call executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Bound on the primary attempt. Defaults to `2000`.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Bound on the fallback attempt. Falls back to `max_timeout_ms` when unset.
    #[serde(default)]
    pub fallback_attempt_timeout_ms: Option<u64>,
}

fn default_max_timeout_ms() -> u64 {
    2000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_timeout_ms: default_max_timeout_ms(), fallback_attempt_timeout_ms: None }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    #[must_use]
    pub fn fallback_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_attempt_timeout_ms.unwrap_or(self.max_timeout_ms))
    }
}

/// Worker thread settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether large batches may leave the host runtime at all. Defaults to `true`.
    #[serde(default = "default_worker_enabled")]
    pub enabled: bool,

    /// Batches with at least this many calls are offloaded. Defaults to `10`.
    #[serde(default = "default_offload_threshold")]
    pub offload_threshold: usize,
}

fn default_worker_enabled() -> bool {
    true
}

fn default_offload_threshold() -> usize {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { enabled: default_worker_enabled(), offload_threshold: default_offload_threshold() }
    }
}

/// Fallback switcher thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitcherConfig {
    /// Failures inside the window that trip fallback mode. Defaults to `3`.
    #[serde(default = "default_events_threshold")]
    pub events_threshold: usize,

    /// Length of the trailing failure window. Defaults to `60000`.
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,

    /// How long fallback mode lasts after a trip. Defaults to `300000`.
    #[serde(default = "default_restore_timeout_ms")]
    pub restore_timeout_ms: u64,
}

fn default_events_threshold() -> usize {
    3
}

fn default_fallback_timeout_ms() -> u64 {
    60_000
}

fn default_restore_timeout_ms() -> u64 {
    300_000
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            events_threshold: default_events_threshold(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            restore_timeout_ms: default_restore_timeout_ms(),
        }
    }
}

impl SwitcherConfig {
    #[must_use]
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    #[must_use]
    pub fn restore_timeout(&self) -> Duration {
        Duration::from_millis(self.restore_timeout_ms)
    }
}

/// HTTP client limits shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum in-flight HTTP requests. Defaults to `200`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// Permit acquisition timeout. Defaults to `500`.
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,

    /// Permit acquisition timeout once permits run scarce. Defaults to `100`.
    #[serde(default = "default_permit_timeout_scarce_ms")]
    pub permit_timeout_scarce_ms: u64,

    /// Below this many free permits the scarce timeout applies. Defaults to `10`.
    #[serde(default = "default_scarce_permit_threshold")]
    pub scarce_permit_threshold: usize,

    /// TCP connect timeout. Defaults to `5000`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_concurrent_limit() -> usize {
    200
}

fn default_permit_timeout_ms() -> u64 {
    500
}

fn default_permit_timeout_scarce_ms() -> u64 {
    100
}

fn default_scarce_permit_threshold() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
            permit_timeout_scarce_ms: default_permit_timeout_scarce_ms(),
            scarce_permit_threshold: default_scarce_permit_threshold(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter, overridden by `RUST_LOG`. Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root configuration of a [`MulticallEngine`](crate::engine::MulticallEngine).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MulticallConfig {
    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub switcher: SwitcherConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MulticallConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields (e.g.
    /// `MULTICALL__EXECUTOR__MAX_TIMEOUT_MS=3000`). A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("scheduler.urgent_window_ms", default_urgent_window_ms())?
            .set_default("scheduler.background_window_ms", default_background_window_ms())?
            .set_default("executor.max_timeout_ms", default_max_timeout_ms())?
            .set_default("worker.enabled", default_worker_enabled())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("MULTICALL").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/multicall.toml`, or the path in `MULTICALL_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("MULTICALL_CONFIG")
            .unwrap_or_else(|_| "config/multicall.toml".to_string());
        Self::from_file(&config_path)
    }

    #[must_use]
    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.chains.push(chain);
        self
    }

    #[must_use]
    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Switcher settings for a chain, honouring its override.
    #[must_use]
    pub fn switcher_for(&self, chain: &ChainConfig) -> SwitcherConfig {
        chain.switcher.clone().unwrap_or_else(|| self.switcher.clone())
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.chains.is_empty() {
            return Err("No chains configured".to_string());
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(format!("Duplicate chain id: {}", chain.chain_id));
            }
            for (label, url) in
                [("primary", &chain.primary_rpc_url), ("fallback", &chain.fallback_rpc_url)]
            {
                if url.is_empty() {
                    return Err(format!("Empty {label} RPC URL for chain {}", chain.chain_id));
                }
                if !url.starts_with("http") {
                    return Err(format!(
                        "Invalid {label} RPC URL for chain {}: {url}",
                        chain.chain_id
                    ));
                }
            }
            if chain.max_batch_size == 0 {
                return Err(format!(
                    "Max batch size must be greater than 0 for chain {}",
                    chain.chain_id
                ));
            }
            if let Some(switcher) = &chain.switcher {
                Self::validate_switcher(switcher)?;
            }
        }

        Self::validate_switcher(&self.switcher)?;

        if self.scheduler.urgent_window_ms == 0 || self.scheduler.background_window_ms == 0 {
            return Err("Scheduler windows must be greater than 0".to_string());
        }

        if self.executor.max_timeout_ms == 0 ||
            self.executor.fallback_attempt_timeout_ms == Some(0)
        {
            return Err("Executor timeouts must be greater than 0".to_string());
        }

        if self.worker.offload_threshold == 0 {
            return Err("Worker offload threshold must be greater than 0".to_string());
        }

        if self.transport.concurrent_limit == 0 {
            return Err("Transport concurrent limit must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    fn validate_switcher(switcher: &SwitcherConfig) -> Result<(), String> {
        if switcher.events_threshold == 0 {
            return Err("Switcher events threshold must be greater than 0".to_string());
        }
        if switcher.fallback_timeout_ms == 0 || switcher.restore_timeout_ms == 0 {
            return Err("Switcher timeouts must be greater than 0".to_string());
        }
        Ok(())
    }
}
