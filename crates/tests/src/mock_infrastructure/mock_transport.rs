//! Scriptable in-process transport.

use async_trait::async_trait;
use multicall_core::{
    types::{CallOutcome, FlatCall},
    upstream::{Endpoint, EndpointKind, MulticallTransport, TransportError},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// What an endpoint does when it receives a multicall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointBehavior {
    /// Answers every call.
    Succeed,
    /// Fails the whole multicall with an HTTP 503.
    Fail,
    /// Never answers.
    Hang,
    /// Answers after the given delay.
    Delay(Duration),
}

/// One physical multicall as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedMulticall {
    pub endpoint: EndpointKind,
    pub methods: Vec<String>,
    /// Name of the OS thread that executed the multicall.
    pub thread: Option<String>,
}

impl RecordedMulticall {
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// In-process [`MulticallTransport`] with scripted per-endpoint behavior.
///
/// Successful calls return [`MockTransport::value_for`], so identical calls always produce
/// identical values regardless of which caller asked.
pub struct MockTransport {
    primary: Mutex<EndpointBehavior>,
    fallback: Mutex<EndpointBehavior>,
    reverting: Mutex<HashSet<String>>,
    recorded: Mutex<Vec<RecordedMulticall>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            primary: Mutex::new(EndpointBehavior::Succeed),
            fallback: Mutex::new(EndpointBehavior::Succeed),
            reverting: Mutex::new(HashSet::new()),
            recorded: Mutex::new(Vec::new()),
        })
    }

    pub fn set_primary(&self, behavior: EndpointBehavior) {
        *self.primary.lock() = behavior;
    }

    pub fn set_fallback(&self, behavior: EndpointBehavior) {
        *self.fallback.lock() = behavior;
    }

    /// Makes every call to `method` revert on-chain.
    pub fn revert_method(&self, method: &str) {
        self.reverting.lock().insert(method.to_string());
    }

    /// Value returned for a successful call of `method` with `args`.
    #[must_use]
    pub fn value_for(method: &str, args: &[Value]) -> Value {
        json!({ "method": method, "args": args })
    }

    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedMulticall> {
        self.recorded.lock().clone()
    }

    /// Number of physical multicalls sent to `endpoint`.
    #[must_use]
    pub fn multicalls_to(&self, endpoint: EndpointKind) -> usize {
        self.recorded.lock().iter().filter(|r| r.endpoint == endpoint).count()
    }

    pub fn clear(&self) {
        self.recorded.lock().clear();
    }

    fn answer(&self, calls: &[FlatCall]) -> Vec<CallOutcome> {
        let reverting = self.reverting.lock();
        calls
            .iter()
            .map(|flat| {
                if reverting.contains(&flat.call.method_name) {
                    CallOutcome::Reverted("execution reverted".to_string())
                } else {
                    CallOutcome::Success(Self::value_for(&flat.call.method_name, &flat.call.args))
                }
            })
            .collect()
    }
}

#[async_trait]
impl MulticallTransport for MockTransport {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        calls: &[FlatCall],
    ) -> Result<Vec<CallOutcome>, TransportError> {
        self.recorded.lock().push(RecordedMulticall {
            endpoint: endpoint.kind,
            methods: calls.iter().map(|c| c.call.method_name.clone()).collect(),
            thread: std::thread::current().name().map(str::to_string),
        });

        let behavior = match endpoint.kind {
            EndpointKind::Primary => *self.primary.lock(),
            EndpointKind::Fallback => *self.fallback.lock(),
        };

        match behavior {
            EndpointBehavior::Succeed => Ok(self.answer(calls)),
            EndpointBehavior::Fail => {
                Err(TransportError::HttpError(503, "service unavailable".to_string()))
            }
            EndpointBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(TransportError::Timeout)
            }
            EndpointBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.answer(calls))
            }
        }
    }
}
