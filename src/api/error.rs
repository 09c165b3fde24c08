//! Classified failures of external calls.

use thiserror::Error;

/// Failure of a gateway, economic provider, or notifier call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("order rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GatewayError::Http { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Malformed(_) | GatewayError::NotFound(_) | GatewayError::Rejected(_) => {
                false
            }
        }
    }

    /// Wrap for `backoff::future::retry`.
    pub fn into_backoff(self) -> backoff::Error<Self> {
        if self.is_transient() {
            backoff::Error::transient(self)
        } else {
            backoff::Error::permanent(self)
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
