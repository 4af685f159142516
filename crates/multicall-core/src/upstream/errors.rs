use thiserror::Error;

/// Classification of JSON-RPC errors returned for individual batch elements.
///
/// Decides whether an element-level error is the caller's problem (a revert, bad params)
/// or the endpoint's problem (rate limiting, internal errors):
/// - Execution and client errors stay per-call and never trigger fallback
/// - Provider, parse and rate-limit errors that hit a whole chunk are treated as a transport
///   failure of that endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Invalid request, method not found, invalid params.
    ClientError,
    /// Internal or server error of the endpoint.
    ProviderError,
    /// Limit exceeded (-32005).
    RateLimit,
    /// Malformed payload (-32700).
    ParseError,
    /// Reverts and other execution failures of the call itself.
    ExecutionError,
}

impl RpcErrorCategory {
    /// Classifies a JSON-RPC error code and message.
    ///
    /// In the -32000 to -32099 server range the message is inspected to separate reverts
    /// from provider failures.
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32602..=-32600 => Self::ClientError,
            -32603 => Self::ProviderError,
            -32005 => Self::RateLimit,
            3 => Self::ExecutionError,
            -32099..=-32000 => {
                let message_lower = message.to_lowercase();
                if message_lower.contains("execution reverted") ||
                    message_lower.contains("revert") ||
                    message_lower.contains("out of gas") ||
                    message_lower.contains("invalid opcode")
                {
                    Self::ExecutionError
                } else {
                    Self::ProviderError
                }
            }
            _ => Self::ProviderError,
        }
    }

    /// Returns `true` if this error says something about the endpoint rather than the call.
    #[must_use]
    pub fn is_endpoint_fault(&self) -> bool {
        matches!(self, Self::ProviderError | Self::ParseError | Self::RateLimit)
    }
}

/// Errors of one physical multicall against one endpoint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The attempt exceeded its time box.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status. First field is the status code.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// JSON-RPC error that applies to the whole request.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed or did not match the request.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be encoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client-side concurrency limit rejected the request.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),
}

impl TransportError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Static label for telemetry.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::RpcError(code, message) => {
                match RpcErrorCategory::from_code_and_message(*code, message) {
                    RpcErrorCategory::ClientError => "rpc_client_error",
                    RpcErrorCategory::ProviderError => "rpc_provider_error",
                    RpcErrorCategory::RateLimit => "rpc_rate_limit",
                    RpcErrorCategory::ParseError => "rpc_parse_error",
                    RpcErrorCategory::ExecutionError => "rpc_execution_error",
                }
            }
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
        }
    }
}
