//! Per-request cascade planning.
//!
//! The router decides which tiers a request will visit and the confidence
//! each must reach to end the cascade. It looks only at cheap text signals
//! and breaker health; it never calls a model.

use serde::Serialize;
use triage_core::{ModelTier, TextFeatures};

use crate::config::{RouterConfig, TierConfigs};
use crate::resilience::BreakerRegistry;

/// One cascade step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanStep {
    pub tier: ModelTier,

    /// Confidence at or above which the cascade stops here
    pub stop_confidence: f64,
}

/// Ordered cascade for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadePlan {
    /// Never empty
    pub steps: Vec<PlanStep>,

    /// Every candidate tier was unavailable; `steps` is `[Rules]` and the
    /// result will be degraded
    pub forced: bool,

    /// Trivial input; only the rules tier was planned
    pub fast_path: bool,

    /// Tiers left out because their breaker refused calls
    pub skipped: Vec<ModelTier>,

    pub signals: TextFeatures,
}

impl CascadePlan {
    pub fn tiers(&self) -> Vec<ModelTier> {
        self.steps.iter().map(|s| s.tier).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds cascade plans from tier thresholds and breaker health.
#[derive(Debug, Clone)]
pub struct StrategyRouter {
    tiers: TierConfigs,
    config: RouterConfig,
}

impl StrategyRouter {
    pub fn new(tiers: TierConfigs, config: RouterConfig) -> Self {
        Self { tiers, config }
    }

    fn step(&self, tier: ModelTier) -> PlanStep {
        PlanStep {
            tier,
            stop_confidence: self.tiers.get(tier).stop_confidence,
        }
    }

    /// The only step of a fast-path plan, accepted at any confidence.
    fn fast_path_step() -> PlanStep {
        PlanStep {
            tier: ModelTier::Rules,
            stop_confidence: 0.0,
        }
    }

    /// Plan the cascade for `text`.
    ///
    /// Tiers are only ever omitted for breaker health, except that trivial
    /// input (at most `fast_path_max_tokens` tokens) is planned rules-only
    /// while the rules tier is available. The plan is forced only when no
    /// tier at all is available.
    pub fn plan(&self, text: &str, breakers: &BreakerRegistry) -> CascadePlan {
        let signals = TextFeatures::extract(text);

        let (available, skipped): (Vec<ModelTier>, Vec<ModelTier>) = ModelTier::CASCADE
            .iter()
            .copied()
            .partition(|tier| breakers.is_available(*tier));

        let forced = available.is_empty();
        let fast_path = signals.is_trivial(self.config.fast_path_max_tokens)
            && available.contains(&ModelTier::Rules);
        let steps = if forced {
            tracing::warn!(skipped = ?skipped, "No tier available, forcing rules-only plan");
            vec![self.step(ModelTier::Rules)]
        } else if fast_path {
            vec![Self::fast_path_step()]
        } else {
            available.into_iter().map(|tier| self.step(tier)).collect()
        };

        tracing::debug!(
            tiers = ?steps.iter().map(|s| s.tier).collect::<Vec<_>>(),
            forced,
            fast_path,
            char_count = signals.char_count,
            token_count = signals.token_count,
            "Cascade planned"
        );

        CascadePlan {
            steps,
            forced,
            fast_path,
            skipped,
            signals,
        }
    }
}
