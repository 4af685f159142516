//! Core type definitions for read requests, flattened batches and results.
//!
//! # Type Categories
//!
//! ## Caller-Facing Types
//! - [`MulticallRequest`], [`CallGroup`], [`CallSpec`]: what application code submits
//! - [`MulticallResult`], [`CallReturn`]: what each caller receives back, keyed by the
//!   caller's own group and call names
//!
//! ## Engine-Internal Types
//! - [`Call`]: one normalised physical read, hashed into a
//!   [`CallIdentity`](crate::identity::CallIdentity)
//! - [`FlatCall`], [`MulticallPayload`]: the deduplicated batch shipped to an executor
//! - [`BatchResult`], [`CallOutcome`]: the flat response, keyed by contract key then identity
//!
//! Every engine-internal type is `Serialize + Deserialize` so a batch can be copied across
//! the worker thread boundary without sharing live references.

use crate::identity::{digest_value, CallIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Numeric chain identifier (e.g. `42161` for Arbitrum One).
pub type ChainId = u64;

/// Scheduling priority requested by a caller.
///
/// Interactive reads ask for [`Priority::Urgent`] and ride the short throttle window;
/// periodic refreshes ask for [`Priority::Background`] and ride the long one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    Background,
}

/// A single normalised remote read.
///
/// Immutable once built. The address is lowercased so that checksummed and plain
/// spellings of the same contract share an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub address: String,
    pub abi: Value,
    pub method_name: String,
    pub args: Vec<Value>,
    #[serde(default)]
    pub hash_args: bool,
}

impl Call {
    #[must_use]
    pub fn new(
        address: impl AsRef<str>,
        abi: Value,
        method_name: impl Into<String>,
        args: Vec<Value>,
        hash_args: bool,
    ) -> Self {
        Self {
            address: address.as_ref().to_ascii_lowercase(),
            abi,
            method_name: method_name.into(),
            args,
            hash_args,
        }
    }

    /// Returns the stable content identity of this call.
    #[must_use]
    pub fn identity(&self) -> CallIdentity {
        CallIdentity::of(self)
    }

    /// Returns the arguments as they are put on the wire.
    ///
    /// With `hash_args` set, every argument is replaced by the hex digest of its canonical
    /// encoding.
    #[must_use]
    pub fn encoded_args(&self) -> Vec<Value> {
        if !self.hash_args {
            return self.args.clone();
        }

        self.args
            .iter()
            .map(|arg| Value::String(format!("0x{}", hex::encode(digest_value(arg)))))
            .collect()
    }
}

/// One caller-named read inside a [`CallGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    pub method_name: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub hash_params: bool,
}

impl CallSpec {
    #[must_use]
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self { method_name: method_name.into(), params, hash_params: false }
    }

    #[must_use]
    pub fn hashed(mut self) -> Self {
        self.hash_params = true;
        self
    }
}

/// Calls sharing one contract and ABI, keyed by names the caller chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGroup {
    pub contract_address: String,
    #[serde(default)]
    pub abi: Value,
    pub calls: BTreeMap<String, CallSpec>,
}

impl CallGroup {
    #[must_use]
    pub fn new(contract_address: impl Into<String>, abi: Value) -> Self {
        Self { contract_address: contract_address.into(), abi, calls: BTreeMap::new() }
    }

    #[must_use]
    pub fn call(mut self, name: impl Into<String>, spec: CallSpec) -> Self {
        self.calls.insert(name.into(), spec);
        self
    }

    /// Builds the normalised physical call for one named entry.
    #[must_use]
    pub fn to_call(&self, spec: &CallSpec) -> Call {
        Call::new(
            &self.contract_address,
            self.abi.clone(),
            spec.method_name.clone(),
            spec.params.clone(),
            spec.hash_params,
        )
    }
}

/// A caller's request: group name to [`CallGroup`].
///
/// # Example
///
/// ```
/// use multicall_core::types::{CallGroup, CallSpec, MulticallRequest};
/// use serde_json::json;
///
/// let request = MulticallRequest::new().group(
///     "token",
///     CallGroup::new("0xaf88d065e77c8cC2239327C5EDb3A432268e5831", json!([]))
///         .call("balance", CallSpec::new("balanceOf", vec![json!("0x01")]))
///         .call("supply", CallSpec::new("totalSupply", vec![])),
/// );
/// assert_eq!(request.call_count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MulticallRequest {
    pub groups: BTreeMap<String, CallGroup>,
}

impl MulticallRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn group(mut self, name: impl Into<String>, group: CallGroup) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.groups.values().map(|g| g.calls.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.call_count() == 0
    }
}

/// Per-call entry of a [`MulticallResult`] data map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReturn {
    pub success: bool,
    pub return_values: Value,
}

impl CallReturn {
    #[must_use]
    pub fn ok(return_values: Value) -> Self {
        Self { success: true, return_values }
    }

    #[must_use]
    pub fn failed() -> Self {
        Self { success: false, return_values: Value::Null }
    }
}

/// Result delivered to one caller, keyed by the caller's group and call names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MulticallResult {
    pub success: bool,
    pub errors: HashMap<String, HashMap<String, String>>,
    pub data: HashMap<String, HashMap<String, CallReturn>>,
}

impl MulticallResult {
    /// Result for a request that contained no calls.
    #[must_use]
    pub fn empty() -> Self {
        Self { success: true, ..Self::default() }
    }

    /// Result in which every named call failed with the same message.
    #[must_use]
    pub fn failed(request: &MulticallRequest, message: &str) -> Self {
        let mut result = Self::default();
        for (group_name, group) in &request.groups {
            for call_name in group.calls.keys() {
                result
                    .errors
                    .entry(group_name.clone())
                    .or_default()
                    .insert(call_name.clone(), message.to_string());
                result
                    .data
                    .entry(group_name.clone())
                    .or_default()
                    .insert(call_name.clone(), CallReturn::failed());
            }
        }
        result
    }

    #[must_use]
    pub fn value(&self, group: &str, call: &str) -> Option<&Value> {
        self.data
            .get(group)
            .and_then(|calls| calls.get(call))
            .filter(|ret| ret.success)
            .map(|ret| &ret.return_values)
    }

    #[must_use]
    pub fn error(&self, group: &str, call: &str) -> Option<&str> {
        self.errors.get(group).and_then(|calls| calls.get(call)).map(String::as_str)
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.values().map(HashMap::len).sum()
    }
}

/// Outcome of one physical call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call executed and returned data.
    Success(Value),
    /// The multicall succeeded but this call reverted or returned invalid data.
    Reverted(String),
    /// The whole physical multicall failed on every endpoint.
    Failed(String),
}

impl CallOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One deduplicated entry of a flattened batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatCall {
    pub identity: CallIdentity,
    pub call: Call,
}

impl FlatCall {
    #[must_use]
    pub fn new(call: Call) -> Self {
        Self { identity: call.identity(), call }
    }

    /// Key of the contract group this call is filed under in a [`BatchResult`].
    #[must_use]
    pub fn contract_key(&self) -> &str {
        &self.call.address
    }
}

/// The flattened, deduplicated set of calls of one scheduling cycle for one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MulticallPayload {
    pub calls: Vec<FlatCall>,
}

impl MulticallPayload {
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Flat response of one physical multicall, keyed by contract key then identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub outcomes: HashMap<String, HashMap<CallIdentity, CallOutcome>>,
}

impl BatchResult {
    /// Zips the ordered outcomes returned by a transport onto the payload.
    ///
    /// The batch is successful unless every call in it failed.
    #[must_use]
    pub fn from_outcomes(payload: &MulticallPayload, outcomes: Vec<CallOutcome>) -> Self {
        let mut result = Self { success: payload.is_empty(), outcomes: HashMap::new() };
        for (flat, outcome) in payload.calls.iter().zip(outcomes) {
            result.success |= outcome.is_success();
            result.insert(flat, outcome);
        }
        result
    }

    /// Result in which every call of the payload failed with `message`.
    #[must_use]
    pub fn total_failure(payload: &MulticallPayload, message: &str) -> Self {
        let mut result = Self { success: false, outcomes: HashMap::new() };
        for flat in &payload.calls {
            result.insert(flat, CallOutcome::Failed(message.to_string()));
        }
        result
    }

    fn insert(&mut self, flat: &FlatCall, outcome: CallOutcome) {
        self.outcomes
            .entry(flat.contract_key().to_string())
            .or_default()
            .insert(flat.identity, outcome);
    }

    #[must_use]
    pub fn outcome(&self, contract_key: &str, identity: &CallIdentity) -> Option<&CallOutcome> {
        self.outcomes.get(contract_key).and_then(|calls| calls.get(identity))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
