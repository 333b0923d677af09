//! Remote inference-server backend.
//!
//! Speaks the prediction protocol shared by the zero-shot and DistilBERT
//! servers: `POST {base_url}/predictions/{model}` with `{"text": ...}`,
//! answered by `{"label", "confidence", "probabilities"}`. Health is
//! `GET {base_url}/ping`.

use super::{
    secrets::BackendCredential, BackendError, PredictionRequest, PredictionResponse, TierBackend,
};
use async_trait::async_trait;
use std::time::Duration;
use triage_core::TierPrediction;

/// Connect timeout for the shared client. Per-request timeouts come from
/// the caller.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP backend for one model on one inference server.
pub struct HttpTierBackend {
    name: String,
    base_url: String,
    model_name: String,
    credential: Option<BackendCredential>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTierBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("credential", &self.credential)
            .finish()
    }
}

impl HttpTierBackend {
    pub fn new(
        base_url: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        let model_name = model_name.into();
        Ok(Self {
            name: format!("http:{model_name}"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_name,
            credential: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_credential(mut self, credential: BackendCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn predictions_url(&self) -> String {
        format!("{}/predictions/{}", self.base_url, self.model_name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Some(credential) => request.bearer_auth(credential.expose()),
            None => request,
        }
    }

    fn map_send_error(err: reqwest::Error, timeout: Duration) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl TierBackend for HttpTierBackend {
    async fn classify(&self, text: &str, timeout: Duration) -> Result<TierPrediction, BackendError> {
        let body = PredictionRequest {
            text: text.to_string(),
        };

        let response = self
            .authorize(self.client.post(self.predictions_url()))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), message));
        }

        let body: PredictionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(timeout)
            } else {
                BackendError::MalformedResponse(e.to_string())
            }
        })?;

        body.into_prediction()
    }

    async fn health_check(&self) -> bool {
        let request = self
            .authorize(self.client.get(format!("{}/ping", self.base_url)))
            .timeout(HEALTH_TIMEOUT);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(backend = %self.name, error = %e, "Health probe failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
