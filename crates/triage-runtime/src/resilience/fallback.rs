//! Why a result was produced under degraded conditions.

use serde::{Deserialize, Serialize};

/// Reason a result carries `degraded = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Every breaker was open; the router forced a rules-only plan
    ForcedPlan,

    /// Every planned tier failed transiently
    AllTiersExhausted,

    /// Tiers answered but none reached its stop confidence, and the
    /// terminal tier was not available to settle it
    BelowThreshold,

    /// The request deadline cut the cascade short
    DeadlineExceeded,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::ForcedPlan => "forced_plan",
            FallbackReason::AllTiersExhausted => "all_tiers_exhausted",
            FallbackReason::BelowThreshold => "below_threshold",
            FallbackReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
