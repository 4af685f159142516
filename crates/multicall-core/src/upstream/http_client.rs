use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{config::TransportConfig, upstream::TransportError};

/// HTTP client with semaphore-based concurrency control.
///
/// Every physical multicall is one POST. The client never retries; the batch executor owns
/// the retry policy.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: TransportConfig,
}

/// RAII guard ensuring semaphore permits are always released.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }

    fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpClient {
    /// Sanitizes network errors so endpoint URLs (which often embed API keys) never reach
    /// logs or caller-visible error strings.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: TransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(64)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("multicall-core/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                TransportError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)),
            config,
        })
    }

    /// Sends one HTTP POST with a JSON body.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if permit acquisition or the request times out
    /// - [`TransportError::ConcurrencyLimit`] if the semaphore is closed
    /// - [`TransportError::HttpError`] for non-success HTTP status codes
    /// - [`TransportError::ConnectionFailed`] for network-related failures
    pub async fn post_json(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, TransportError> {
        let permit_timeout =
            if self.concurrent_limit.available_permits() < self.config.scarce_permit_threshold {
                Duration::from_millis(self.config.permit_timeout_scarce_ms)
            } else {
                Duration::from_millis(self.config.permit_timeout_ms)
            };

        let permit =
            tokio::time::timeout(permit_timeout, Arc::clone(&self.concurrent_limit).acquire_owned())
                .await
                .map_err(|_| {
                    tracing::warn!(
                        available_permits = self.concurrent_limit.available_permits(),
                        "http client semaphore acquisition timeout"
                    );
                    TransportError::Timeout
                })?
                .map_err(|_| TransportError::ConcurrencyLimit("semaphore closed".to_string()))?;

        let permit_guard = PermitGuard::new(permit, self.concurrent_limit.clone());

        let result = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let bytes = response.bytes().await.map_err(TransportError::Network)?;
                tracing::trace!(
                    available_permits = permit_guard.available_permits(),
                    bytes = bytes.len(),
                    "http request completed"
                );
                Ok(bytes)
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let raw_text = response.text().await.unwrap_or_default();
                let sanitized_text = if raw_text.len() > 256 {
                    let cut = raw_text.char_indices().nth(256).map_or(raw_text.len(), |(i, _)| i);
                    format!("{}... (truncated)", &raw_text[..cut])
                } else {
                    raw_text
                };
                Err(TransportError::HttpError(status, sanitized_text))
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::ConnectionFailed(Self::sanitize_network_error(&e))),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}
