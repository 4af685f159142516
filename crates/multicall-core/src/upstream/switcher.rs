use crate::{
    config::SwitcherConfig,
    telemetry::{Telemetry, TelemetryEvent},
    types::ChainId,
};
use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

/// Internal mutable state protected by a single lock.
///
/// The failure window, the mode flag and the trip timestamp change together, so they
/// live under one `Mutex` and every transition happens in one acquisition.
#[derive(Debug)]
struct SwitcherInternalState {
    /// Timestamps of primary-endpoint failures inside the trailing window.
    failures: VecDeque<Instant>,
    /// When fallback mode was entered, `None` while on the primary.
    fallback_since: Option<Instant>,
}

impl SwitcherInternalState {
    fn new() -> Self {
        Self { failures: VecDeque::new(), fallback_since: None }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Which endpoint the switcher currently selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitcherMode {
    Primary,
    Fallback,
}

/// Point-in-time view of a switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitcherSnapshot {
    pub mode: SwitcherMode,
    pub recent_failures: usize,
    pub fallback_for: Option<Duration>,
}

/// Sliding-window circuit breaker choosing between the primary and fallback endpoint.
///
/// Counts primary failures inside a trailing `fallback_timeout` window. Once
/// `events_threshold` failures sit inside the window the switcher flips into fallback
/// mode, and it restores itself after `restore_timeout` without a new trip.
///
/// ```text
///            k failures within window
///  Primary ────────────────────────────► Fallback
///     ▲                                     │
///     └─────────────────────────────────────┘
///        restore_timeout elapsed since trip
/// ```
///
/// # Thread Safety
///
/// All mutable state sits behind one `parking_lot::Mutex`; no method holds it across an
/// await point.
pub struct FallbackSwitcher {
    chain_id: ChainId,
    inner: Mutex<SwitcherInternalState>,
    config: SwitcherConfig,
    telemetry: Telemetry,
}

impl FallbackSwitcher {
    #[must_use]
    pub fn new(chain_id: ChainId, config: SwitcherConfig, telemetry: Telemetry) -> Self {
        Self { chain_id, inner: Mutex::new(SwitcherInternalState::new()), config, telemetry }
    }

    #[must_use]
    pub fn config(&self) -> &SwitcherConfig {
        &self.config
    }

    /// Returns `true` while the fallback endpoint should be preferred.
    ///
    /// Restores the primary if `restore_timeout` has elapsed since the trip.
    pub fn is_fallback(&self) -> bool {
        self.mode() == SwitcherMode::Fallback
    }

    /// Returns the current mode, applying auto-restore first.
    pub fn mode(&self) -> SwitcherMode {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let Some(since) = inner.fallback_since else {
            return SwitcherMode::Primary;
        };

        if now.saturating_duration_since(since) < self.config.restore_timeout() {
            return SwitcherMode::Fallback;
        }

        inner.fallback_since = None;
        inner.failures.clear();
        drop(inner);

        tracing::info!(chain_id = self.chain_id, "fallback switcher restored primary endpoint");
        self.telemetry.emit(TelemetryEvent::FallbackOff { chain_id: self.chain_id });
        SwitcherMode::Primary
    }

    /// Records a primary-endpoint failure.
    ///
    /// Returns `true` if this failure tripped the switcher into fallback mode. Failures
    /// recorded while already in fallback mode do not extend it.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let window = self.config.fallback_timeout();
        let mut inner = self.inner.lock();

        if inner.fallback_since.is_some() {
            return false;
        }

        inner.prune(now, window);
        inner.failures.push_back(now);

        let failures = inner.failures.len();
        if failures < self.config.events_threshold.max(1) {
            tracing::debug!(
                chain_id = self.chain_id,
                failures,
                threshold = self.config.events_threshold,
                "fallback switcher recorded failure"
            );
            return false;
        }

        inner.fallback_since = Some(now);
        inner.failures.clear();
        drop(inner);

        tracing::warn!(
            chain_id = self.chain_id,
            failures,
            window_ms = window.as_millis(),
            restore_ms = self.config.restore_timeout_ms,
            "fallback switcher tripped, preferring fallback endpoint"
        );
        self.telemetry.emit(TelemetryEvent::FallbackOn { chain_id: self.chain_id, failures });
        true
    }

    /// Forces fallback mode now, as if the threshold had been reached.
    pub fn trigger_fallback(&self) {
        let mut inner = self.inner.lock();
        let already = inner.fallback_since.is_some();
        inner.fallback_since = Some(Instant::now());
        inner.failures.clear();
        drop(inner);

        if !already {
            tracing::warn!(chain_id = self.chain_id, "fallback mode triggered manually");
            self.telemetry
                .emit(TelemetryEvent::FallbackOn { chain_id: self.chain_id, failures: 0 });
        }
    }

    /// Returns to the primary endpoint immediately and forgets recorded failures.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let was_fallback = inner.fallback_since.take().is_some();
        inner.failures.clear();
        drop(inner);

        if was_fallback {
            self.telemetry.emit(TelemetryEvent::FallbackOff { chain_id: self.chain_id });
        }
    }

    /// Returns the current state without applying auto-restore.
    #[must_use]
    pub fn snapshot(&self) -> SwitcherSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.prune(now, self.config.fallback_timeout());
        SwitcherSnapshot {
            mode: if inner.fallback_since.is_some() {
                SwitcherMode::Fallback
            } else {
                SwitcherMode::Primary
            },
            recent_failures: inner.failures.len(),
            fallback_for: inner.fallback_since.map(|since| now.saturating_duration_since(since)),
        }
    }
}
