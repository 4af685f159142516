//! Request collection and deduplication.
//!
//! Every submitted request is split into physical [`Call`]s. Calls are filed per chain in a
//! [`PendingStore`] keyed by [`CallIdentity`], so N callers asking for the same read share
//! one [`PendingEntry`] carrying N [`Hook`]s. A hook knows which caller (a [`Submission`])
//! and which `(group, call)` name it resolves.
//!
//! ```text
//! submit(A: {token: {bal: balanceOf(u)}}) ─┐
//!                                          ├─► PendingEntry { hooks: [A.token.bal, B.w.b] }
//! submit(B: {w: {b: balanceOf(u)}})       ─┘
//! ```

use crate::{
    identity::CallIdentity,
    types::{
        Call, CallOutcome, CallReturn, ChainId, FlatCall, MulticallPayload, MulticallRequest,
        MulticallResult,
    },
};
use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::{mem, sync::Arc};
use tokio::sync::oneshot;

/// Accumulates one caller's [`MulticallResult`] as its hooks resolve.
#[derive(Debug)]
struct SubmissionState {
    remaining: usize,
    successes: usize,
    transport_failed: bool,
    result: MulticallResult,
    tx: Option<oneshot::Sender<MulticallResult>>,
}

/// Shared handle to one caller's pending result.
#[derive(Debug, Clone)]
pub struct Submission {
    state: Arc<Mutex<SubmissionState>>,
}

impl Submission {
    fn new(expected: usize, tx: oneshot::Sender<MulticallResult>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SubmissionState {
                remaining: expected,
                successes: 0,
                transport_failed: false,
                result: MulticallResult::default(),
                tx: Some(tx),
            })),
        }
    }

    fn resolve(&self, group: &str, call_name: &str, outcome: &CallOutcome) {
        let mut state = self.state.lock();
        if state.remaining == 0 {
            return;
        }

        let data = state.result.data.entry(group.to_string()).or_default();
        match outcome {
            CallOutcome::Success(value) => {
                data.insert(call_name.to_string(), CallReturn::ok(value.clone()));
                state.successes += 1;
            }
            CallOutcome::Reverted(message) | CallOutcome::Failed(message) => {
                data.insert(call_name.to_string(), CallReturn::failed());
                state
                    .result
                    .errors
                    .entry(group.to_string())
                    .or_default()
                    .insert(call_name.to_string(), message.clone());
                state.transport_failed |= outcome.is_transport_failure();
            }
        }

        state.remaining -= 1;
        if state.remaining > 0 {
            return;
        }

        let mut result = mem::take(&mut state.result);
        result.success = !state.transport_failed && state.successes > 0;
        if let Some(tx) = state.tx.take() {
            // The caller may have dropped its future.
            let _ = tx.send(result);
        }
    }
}

/// Continuation delivering one physical outcome to one `(group, call)` of one caller.
#[derive(Debug)]
pub struct Hook {
    submission: Submission,
    group: String,
    call_name: String,
}

impl Hook {
    #[must_use]
    pub fn new(
        submission: Submission,
        group: impl Into<String>,
        call_name: impl Into<String>,
    ) -> Self {
        Self { submission, group: group.into(), call_name: call_name.into() }
    }

    pub fn resolve(self, outcome: &CallOutcome) {
        self.submission.resolve(&self.group, &self.call_name, outcome);
    }

    #[must_use]
    pub fn destination(&self) -> (&str, &str) {
        (&self.group, &self.call_name)
    }
}

/// One unique physical call and everyone waiting for it.
#[derive(Debug)]
pub struct PendingEntry {
    pub call: Call,
    pub hooks: Vec<Hook>,
}

/// Pending entries of one chain for the current scheduling cycle.
///
/// Entries keep their registration order so payloads are deterministic.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: AHashMap<CallIdentity, PendingEntry>,
    order: Vec<CallIdentity>,
}

impl PendingStore {
    /// Files `hook` under the identity of `call`, creating the entry if needed.
    ///
    /// Returns `true` if a new entry was created.
    pub fn register(&mut self, call: Call, hook: Hook) -> bool {
        let identity = call.identity();
        if let Some(entry) = self.entries.get_mut(&identity) {
            entry.hooks.push(hook);
            return false;
        }

        self.order.push(identity);
        self.entries.insert(identity, PendingEntry { call, hooks: vec![hook] });
        true
    }

    /// Number of unique physical calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of logical destinations still waiting.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.entries.values().map(|e| e.hooks.len()).sum()
    }

    #[must_use]
    pub fn entry(&self, identity: &CallIdentity) -> Option<&PendingEntry> {
        self.entries.get(identity)
    }

    /// Removes and returns the hooks of one entry; later calls return nothing.
    pub fn take_hooks(&mut self, identity: &CallIdentity) -> Vec<Hook> {
        self.entries.get_mut(identity).map(|e| mem::take(&mut e.hooks)).unwrap_or_default()
    }

    /// Identities in registration order.
    pub fn identities(&self) -> impl Iterator<Item = &CallIdentity> {
        self.order.iter()
    }

    /// Flattens the store into the deduplicated payload of this cycle.
    #[must_use]
    pub fn to_payload(&self) -> MulticallPayload {
        MulticallPayload {
            calls: self
                .order
                .iter()
                .filter_map(|id| self.entries.get(id))
                .map(|entry| FlatCall { identity: entry.call.identity(), call: entry.call.clone() })
                .collect(),
        }
    }
}

/// Per-chain pending stores.
///
/// A submission registers all of its calls while holding the chain's shard, and a flush swaps
/// the chain's store for an empty one under the same shard, so one submission never straddles
/// two cycles.
///
/// Once [`close`](Self::close) returns, no registration is in progress and none will start,
/// so a final flush sees every hook that will ever be registered.
#[derive(Debug, Default)]
pub struct Collector {
    stores: DashMap<ChainId, PendingStore>,
    closed: RwLock<bool>,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every call of `request` on `chain_id`.
    ///
    /// The receiver yields the caller's result once every one of its calls has resolved.
    /// `request` must not be empty. Returns `None` once the collector is closed.
    pub fn submit(
        &self,
        chain_id: ChainId,
        request: &MulticallRequest,
    ) -> Option<oneshot::Receiver<MulticallResult>> {
        let closed = self.closed.read();
        if *closed {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let submission = Submission::new(request.call_count(), tx);

        let mut store = self.stores.entry(chain_id).or_default();
        let mut created = 0usize;
        for (group_name, group) in &request.groups {
            for (call_name, spec) in &group.calls {
                let hook = Hook::new(submission.clone(), group_name, call_name);
                if store.register(group.to_call(spec), hook) {
                    created += 1;
                }
            }
        }
        let unique = store.len();
        drop(store);
        drop(closed);

        tracing::trace!(
            chain_id,
            calls = request.call_count(),
            new_entries = created,
            unique,
            "registered multicall request"
        );
        Some(rx)
    }

    /// Rejects every later submission, waiting out registrations already under way.
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Atomically replaces the chain's store with an empty one and returns the old store.
    pub fn take(&self, chain_id: ChainId) -> PendingStore {
        self.stores
            .get_mut(&chain_id)
            .map(|mut store| mem::take(&mut *store))
            .unwrap_or_default()
    }

    /// Chains that currently have pending entries.
    #[must_use]
    pub fn pending_chains(&self) -> Vec<ChainId> {
        self.stores.iter().filter(|s| !s.is_empty()).map(|s| *s.key()).collect()
    }

    /// Unique calls pending on `chain_id`.
    #[must_use]
    pub fn pending_calls(&self, chain_id: ChainId) -> usize {
        self.stores.get(&chain_id).map_or(0, |s| s.len())
    }
}
