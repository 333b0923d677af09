//! Backend factories.
//!
//! Endpoints in the config name a backend kind (`local`, `http`). The
//! registry maps each kind to a factory, so a new kind of backend can be
//! added without touching the router or orchestrator.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = BackendRegistry::with_defaults();
//! let backends = registry.build_all(&config.tiers)?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use triage_core::ModelTier;

use super::{BackendCredential, BackendError, HttpTierBackend, LocalRulesBackend, TierBackend};
use crate::config::{EndpointConfig, TierConfigs};

/// Creates backends for one endpoint kind.
pub trait BackendFactory: Send + Sync {
    /// Endpoint kind this factory serves, as written in the config.
    fn kind(&self) -> &'static str;

    /// Create a backend for `tier` from its endpoint configuration.
    fn create(
        &self,
        tier: ModelTier,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn TierBackend>, BackendError>;

    /// Check the endpoint without creating anything.
    fn validate(&self, endpoint: &EndpointConfig) -> Result<(), BackendError> {
        if endpoint.kind() == self.kind() {
            Ok(())
        } else {
            Err(BackendError::NotConfigured(format!(
                "{} factory cannot serve a '{}' endpoint",
                self.kind(),
                endpoint.kind()
            )))
        }
    }

    fn description(&self) -> &'static str {
        "Tier backend"
    }
}

/// Factory for the in-process rules backend.
pub struct LocalBackendFactory;

impl BackendFactory for LocalBackendFactory {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn create(
        &self,
        tier: ModelTier,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn TierBackend>, BackendError> {
        self.validate(endpoint)?;
        if tier != ModelTier::Rules {
            // Only the rules tier has an in-process implementation.
            return Err(BackendError::NotConfigured(format!(
                "{tier} has no local backend"
            )));
        }
        Ok(Arc::new(LocalRulesBackend::new()))
    }

    fn description(&self) -> &'static str {
        "In-process keyword and pattern rules"
    }
}

/// Factory for remote inference-server backends.
pub struct HttpBackendFactory;

impl BackendFactory for HttpBackendFactory {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn create(
        &self,
        _tier: ModelTier,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn TierBackend>, BackendError> {
        self.validate(endpoint)?;
        let EndpointConfig::Http {
            base_url,
            model_name,
            auth_token_env,
        } = endpoint
        else {
            return Err(BackendError::NotConfigured("expected an http endpoint".into()));
        };

        let mut backend = HttpTierBackend::new(base_url.clone(), model_name.clone())?;
        if let Some(var) = auth_token_env {
            backend = backend.with_credential(BackendCredential::from_env(var)?);
        }
        Ok(Arc::new(backend))
    }

    fn validate(&self, endpoint: &EndpointConfig) -> Result<(), BackendError> {
        match endpoint {
            EndpointConfig::Http { base_url, .. } => {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(BackendError::NotConfigured(
                        "base_url must start with http:// or https://".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(BackendError::NotConfigured(format!(
                "http factory cannot serve a '{}' endpoint",
                other.kind()
            ))),
        }
    }

    fn description(&self) -> &'static str {
        "Remote inference server (POST /predictions/{model})"
    }
}

/// Registry of backend factories keyed by endpoint kind.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `local` and `http` factories.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalBackendFactory));
        registry.register(Arc::new(HttpBackendFactory));
        registry
    }

    /// Register a factory, replacing any existing one of the same kind.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    fn factory(&self, kind: &str) -> Result<&Arc<dyn BackendFactory>, BackendError> {
        self.factories.get(kind).ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "Unknown backend kind: '{}'. Available: {:?}",
                kind,
                self.available_kinds()
            ))
        })
    }

    /// Create the backend for one tier.
    pub fn create(
        &self,
        tier: ModelTier,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn TierBackend>, BackendError> {
        self.factory(endpoint.kind())?.create(tier, endpoint)
    }

    pub fn validate(&self, endpoint: &EndpointConfig) -> Result<(), BackendError> {
        self.factory(endpoint.kind())?.validate(endpoint)
    }

    /// Create a backend for every cascade tier.
    pub fn build_all(
        &self,
        tiers: &TierConfigs,
    ) -> Result<HashMap<ModelTier, Arc<dyn TierBackend>>, BackendError> {
        let mut backends = HashMap::new();
        for tier in ModelTier::CASCADE {
            let backend = self.create(tier, &tiers.get(tier).endpoint)?;
            tracing::debug!(tier = %tier, backend = backend.name(), "Backend created");
            backends.insert(tier, backend);
        }
        Ok(backends)
    }

    pub fn available_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}
