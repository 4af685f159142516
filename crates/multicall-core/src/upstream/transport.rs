//! Physical execution of one multicall against one endpoint.
//!
//! [`MulticallTransport`] is the seam between the engine and the network. The engine only
//! needs "run these calls on that endpoint and give me one outcome per call, in order";
//! [`HttpTransport`] does that with JSON-RPC 2.0 batches.
//!
//! # Wire Format
//!
//! Each call becomes one batch element:
//!
//! ```json
//! {"jsonrpc":"2.0","id":0,"method":"balanceOf","params":[{"to":"0xaf88..."},"0x01"]}
//! ```
//!
//! Payloads larger than the endpoint's `max_batch_size` are split into chunks that are sent
//! concurrently. Responses are matched back to calls by `id`, never by position.

use crate::{
    config::TransportConfig,
    types::{CallOutcome, FlatCall},
    upstream::{http_client::HttpClient, Endpoint, RpcErrorCategory, TransportError},
};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{borrow::Cow, sync::Arc, time::Duration};

const JSONRPC_VERSION: Cow<'static, str> = Cow::Borrowed("2.0");

/// Executes one physical multicall.
///
/// Implementations must return exactly one outcome per input call, in input order, or an
/// error if the endpoint as a whole failed. The multicall is atomic from the engine's point
/// of view: there is no partial success at this level.
#[async_trait]
pub trait MulticallTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the endpoint could not serve the multicall.
    async fn execute(
        &self,
        endpoint: &Endpoint,
        calls: &[FlatCall],
    ) -> Result<Vec<CallOutcome>, TransportError>;
}

#[derive(Debug, Serialize)]
struct BatchElement<'a> {
    jsonrpc: Cow<'static, str>,
    id: usize,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ElementError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ElementResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ElementError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchResponse {
    Batch(Vec<ElementResponse>),
    Single(ElementResponse),
}

/// JSON-RPC transport over [`HttpClient`].
///
/// The attempt timeout is enforced by the executor; the per-request HTTP timeout below only
/// guards against sockets that would otherwise hang forever.
pub struct HttpTransport {
    client: Arc<HttpClient>,
    request_timeout: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let request_timeout = Duration::from_millis(config.connect_timeout_ms.saturating_mul(6));
        Ok(Self { client: Arc::new(HttpClient::with_config(config)?), request_timeout })
    }

    fn encode_chunk(chunk: &[FlatCall]) -> Result<bytes::Bytes, TransportError> {
        let elements: Vec<BatchElement<'_>> = chunk
            .iter()
            .enumerate()
            .map(|(id, flat)| {
                let mut params = Vec::with_capacity(flat.call.args.len() + 1);
                params.push(json!({ "to": flat.call.address }));
                params.extend(flat.call.encoded_args());
                BatchElement {
                    jsonrpc: JSONRPC_VERSION,
                    id,
                    method: &flat.call.method_name,
                    params,
                }
            })
            .collect();

        serde_json::to_vec(&elements)
            .map(bytes::Bytes::from)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }

    /// Maps one chunk's response body onto per-call outcomes.
    fn decode_chunk(body: &[u8], expected: usize) -> Result<Vec<CallOutcome>, TransportError> {
        let response: BatchResponse = serde_json::from_slice(body)
            .map_err(|e| TransportError::InvalidResponse(format!("malformed batch: {e}")))?;

        let elements = match response {
            BatchResponse::Batch(elements) => elements,
            BatchResponse::Single(ElementResponse { error: Some(error), .. }) => {
                return Err(TransportError::RpcError(error.code, error.message));
            }
            BatchResponse::Single(_) => {
                return Err(TransportError::InvalidResponse(
                    "expected a batch response".to_string(),
                ));
            }
        };

        let mut slots: Vec<Option<ElementResponse>> = (0..expected).map(|_| None).collect();
        for element in elements {
            let Some(id) = element.id.as_ref().and_then(Value::as_u64) else {
                return Err(TransportError::InvalidResponse("batch element without id".into()));
            };
            let slot = usize::try_from(id).ok().and_then(|i| slots.get_mut(i)).ok_or_else(|| {
                TransportError::InvalidResponse(format!("unexpected batch element id {id}"))
            })?;
            *slot = Some(element);
        }

        let mut first_fault: Option<(i32, String)> = None;
        let mut all_faults = true;
        let mut outcomes = Vec::with_capacity(expected);

        for (id, slot) in slots.into_iter().enumerate() {
            let element = slot.ok_or_else(|| {
                TransportError::InvalidResponse(format!("missing batch element {id}"))
            })?;

            match (element.result, element.error) {
                (_, Some(error)) => {
                    let category =
                        RpcErrorCategory::from_code_and_message(error.code, &error.message);
                    if !category.is_endpoint_fault() {
                        all_faults = false;
                    } else if first_fault.is_none() {
                        first_fault = Some((error.code, error.message.clone()));
                    }
                    outcomes.push(CallOutcome::Reverted(error.message));
                }
                (Some(result), None) => {
                    all_faults = false;
                    outcomes.push(CallOutcome::Success(result));
                }
                (None, None) => {
                    all_faults = false;
                    outcomes.push(CallOutcome::Success(Value::Null));
                }
            }
        }

        if all_faults {
            if let Some((code, message)) = first_fault {
                return Err(TransportError::RpcError(code, message));
            }
        }

        Ok(outcomes)
    }

    async fn execute_chunk(
        &self,
        endpoint: &Endpoint,
        chunk: &[FlatCall],
    ) -> Result<Vec<CallOutcome>, TransportError> {
        let body = Self::encode_chunk(chunk)?;
        let response = self.client.post_json(&endpoint.url, body, self.request_timeout).await?;
        Self::decode_chunk(&response, chunk.len())
    }
}

#[async_trait]
impl MulticallTransport for HttpTransport {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        calls: &[FlatCall],
    ) -> Result<Vec<CallOutcome>, TransportError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = endpoint.max_batch_size.max(1);
        tracing::debug!(
            endpoint = %endpoint.name,
            calls = calls.len(),
            chunks = calls.len().div_ceil(chunk_size),
            "sending multicall"
        );

        let chunks =
            try_join_all(calls.chunks(chunk_size).map(|chunk| self.execute_chunk(endpoint, chunk)))
                .await?;

        Ok(chunks.into_iter().flatten().collect())
    }
}
