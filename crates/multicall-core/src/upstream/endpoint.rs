use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Which member of an [`EndpointPair`] an attempt ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Primary,
    Fallback,
}

impl EndpointKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default number of calls per JSON-RPC batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// One configured RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: Arc<str>,
    pub url: String,
    pub kind: EndpointKind,
    /// Transports split a physical multicall into chunks of at most this many calls.
    pub max_batch_size: usize,
}

impl Endpoint {
    #[must_use]
    pub fn new(name: impl AsRef<str>, url: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            url: url.into(),
            kind,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// The primary and fallback endpoint of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPair {
    pub primary: Endpoint,
    pub fallback: Endpoint,
}

impl EndpointPair {
    #[must_use]
    pub fn new(chain_name: &str, primary_url: &str, fallback_url: &str) -> Self {
        Self {
            primary: Endpoint::new(
                format!("{chain_name}-primary"),
                primary_url,
                EndpointKind::Primary,
            ),
            fallback: Endpoint::new(
                format!("{chain_name}-fallback"),
                fallback_url,
                EndpointKind::Fallback,
            ),
        }
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.primary.max_batch_size = max_batch_size;
        self.fallback.max_batch_size = max_batch_size;
        self
    }

    /// Returns `(selected, alternate)` for the current switcher mode.
    #[must_use]
    pub fn select(&self, prefer_fallback: bool) -> (&Endpoint, &Endpoint) {
        if prefer_fallback {
            (&self.fallback, &self.primary)
        } else {
            (&self.primary, &self.fallback)
        }
    }
}
