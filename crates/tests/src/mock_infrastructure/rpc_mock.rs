//! RPC Mock Builder for JSON-RPC Batch Testing
//!
//! Wraps mockito to serve the batch responses `HttpTransport` expects.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

/// Builder for mock RPC endpoints answering JSON-RPC batches.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl RpcMockBuilder {
    /// Creates a new RPC mock builder with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Answers batches containing `method` with `elements`, one per batch element.
    ///
    /// Each element is either `{"result": ..}` or `{"error": {..}}`; ids are assigned by
    /// position.
    pub async fn mock_batch(&mut self, method: &str, elements: &[Value]) -> &mut Self {
        let body: Vec<Value> = elements
            .iter()
            .enumerate()
            .map(|(id, element)| {
                let mut response = json!({ "jsonrpc": "2.0", "id": id });
                if let (Some(target), Some(fields)) =
                    (response.as_object_mut(), element.as_object())
                {
                    target.extend(fields.clone());
                }
                response
            })
            .collect();

        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#)))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(Value::Array(body).to_string())
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers every request with an HTTP error status.
    pub async fn mock_status(&mut self, status: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .with_status(status)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Asserts that every registered mock was hit as expected.
    pub fn assert_all(&self) {
        for mock in &self.mocks {
            mock.assert();
        }
    }
}

/// A successful batch element.
#[must_use]
pub fn ok(result: Value) -> Value {
    json!({ "result": result })
}

/// A reverted batch element.
#[must_use]
pub fn reverted(message: &str) -> Value {
    json!({ "error": { "code": 3, "message": message } })
}
