//! In-process rules backend.

use super::{BackendError, TierBackend};
use async_trait::async_trait;
use std::time::Duration;
use triage_core::{RulesEngine, TierPrediction};

/// Serves the rules tier without leaving the process. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRulesBackend {
    engine: RulesEngine,
}

impl LocalRulesBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TierBackend for LocalRulesBackend {
    async fn classify(&self, text: &str, _timeout: Duration) -> Result<TierPrediction, BackendError> {
        Ok(self.engine.classify(text))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "local:rules"
    }
}
