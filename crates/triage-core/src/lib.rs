//! # triage-core
//!
//! Deterministic building blocks for Triage intent classification.
//!
//! This crate answers, without any network access:
//! - Which task category does this text most likely ask for? (rules tier)
//! - How demanding is it? (complexity)
//! - Which prompt techniques suit it? (technique table)
//!
//! The remote tiers, circuit breakers and cache live in `triage-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use triage_core::{classify_with_rules, Intent, ModelTier};
//!
//! let result = classify_with_rules("Translate this paragraph into French");
//! assert_eq!(result.intent, Intent::Translation);
//! assert_eq!(result.model_used, ModelTier::Rules);
//! ```

pub mod complexity;
pub mod normalize;
pub mod rules;
pub mod techniques;
pub mod types;

pub use complexity::ComplexityAnalyzer;
pub use normalize::{normalize, TextFeatures};
pub use rules::RulesEngine;
pub use techniques::{suggest_techniques, techniques_for_intent, Technique};
pub use types::{
    clamp_confidence, ClassificationRequest, ClassificationResult, Complexity, Intent, ModelTier,
    TierPrediction, UnknownIntent,
};

/// Turn a tier's prediction into a full result.
///
/// Derives complexity and technique suggestions. `model_used` must be the
/// tier that actually produced `prediction`.
pub fn build_result(
    text: &str,
    prediction: &TierPrediction,
    model_used: ModelTier,
    degraded: bool,
    latency_ms: u64,
) -> ClassificationResult {
    let complexity = ComplexityAnalyzer::new().analyze(text, prediction);

    ClassificationResult {
        intent: prediction.intent,
        confidence: clamp_confidence(prediction.confidence),
        complexity,
        suggested_techniques: suggest_techniques(prediction.intent, complexity),
        model_used,
        degraded,
        cache_hit: false,
        latency_ms,
    }
}

/// Classify using only the in-process rules tier.
pub fn classify_with_rules(text: &str) -> ClassificationResult {
    let prediction = RulesEngine::new().classify(text);
    build_result(text, &prediction, ModelTier::Rules, false, 0)
}
