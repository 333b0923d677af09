//! Tier backends for triage-runtime.
//!
//! Every tier, local or remote, implements [`TierBackend`]. The router and
//! orchestrator only ever see this trait, never a concrete backend type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use triage_core::TierPrediction;

mod factory;
mod http;
mod local;
pub mod secrets;

pub use factory::{BackendFactory, BackendRegistry, HttpBackendFactory, LocalBackendFactory};
pub use http::HttpTierBackend;
pub use local::LocalRulesBackend;
pub use secrets::{BackendCredential, CredentialSource};

/// Errors from a single backend call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Classify an HTTP status code that was not a success.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        // 429 means the backend is overloaded, not that the input was bad.
        if status == 429 || status >= 500 {
            BackendError::Server { status, message }
        } else {
            BackendError::Rejected { status, message }
        }
    }

    /// Transient errors are retried and count against the tier's breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout(_)
            | BackendError::Connection(_)
            | BackendError::Server { .. }
            | BackendError::MalformedResponse(_) => true,
            BackendError::Rejected { .. } | BackendError::NotConfigured(_) => false,
        }
    }
}

/// Request body for `POST /predictions/{model}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub text: String,
}

/// Response body from `POST /predictions/{model}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: Vec<f64>,
}

impl PredictionResponse {
    /// Convert to a prediction. Unknown labels are malformed responses.
    pub fn into_prediction(self) -> Result<TierPrediction, BackendError> {
        let intent = self
            .label
            .parse()
            .map_err(|e: triage_core::UnknownIntent| BackendError::MalformedResponse(e.to_string()))?;
        Ok(TierPrediction::new(intent, self.confidence, self.probabilities))
    }
}

/// One classification capability, implemented by every tier.
#[async_trait]
pub trait TierBackend: Send + Sync {
    /// Classify `text`. Implementations should give up after `timeout`;
    /// the inference client enforces it regardless.
    async fn classify(&self, text: &str, timeout: Duration) -> Result<TierPrediction, BackendError>;

    /// Liveness probe. Never called on the request path.
    async fn health_check(&self) -> bool;

    /// Backend name for logs and metrics.
    fn name(&self) -> &str;
}
