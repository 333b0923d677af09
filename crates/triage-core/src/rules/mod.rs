//! Deterministic rules tier.
//!
//! The rules engine scores every intent against a fixed set of weighted
//! keyword patterns. It never touches the network, so it also serves as the
//! last-resort classifier when every remote tier is unavailable.

mod patterns;

pub use patterns::{IntentPattern, GREETING_PATTERN, INTENT_PATTERNS};

use crate::normalize::normalize;
use crate::types::{Intent, TierPrediction};

/// Score at which a single intent is considered a strong match.
const STRONG_SCORE: f64 = 3.0;

/// Confidence floor for any matched intent.
const BASE_CONFIDENCE: f64 = 0.35;

/// Confidence when nothing matched at all.
const NO_SIGNAL_CONFIDENCE: f64 = 0.30;

/// Added to every score before computing probabilities.
const SMOOTHING: f64 = 0.1;

/// Keyword/pattern intent classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    pub fn new() -> Self {
        Self
    }

    /// Classify text. Deterministic: the same text always yields the same
    /// prediction.
    pub fn classify(&self, text: &str) -> TierPrediction {
        let normalized = normalize(text);

        if normalized.is_empty() {
            return TierPrediction::new(Intent::Conversation, 0.5, uniform());
        }

        if GREETING_PATTERN.is_match(&normalized) {
            let mut probabilities = vec![0.0; Intent::ALL.len()];
            probabilities[Intent::Conversation.index()] = 1.0;
            return TierPrediction::new(Intent::Conversation, 0.95, probabilities);
        }

        let scores = Self::score(&normalized);
        let probabilities = to_probabilities(&scores);

        let (best_index, best) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0_f64), |acc, (i, s)| if s > acc.1 { (i, s) } else { acc });

        if best == 0.0 {
            return TierPrediction::new(Intent::Conversation, NO_SIGNAL_CONFIDENCE, probabilities);
        }

        let runner_up = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best_index)
            .map(|(_, s)| *s)
            .fold(0.0_f64, f64::max);

        let margin = (best - runner_up) / best;
        let strength = (best / STRONG_SCORE).min(1.0);
        let confidence = BASE_CONFIDENCE + 0.60 * margin * strength;

        tracing::trace!(
            intent = %Intent::ALL[best_index],
            best,
            runner_up,
            confidence,
            "Rules tier scored text"
        );

        TierPrediction::new(Intent::ALL[best_index], confidence, probabilities)
    }

    fn score(normalized: &str) -> [f64; 10] {
        let mut scores = [0.0; 10];
        for pattern in INTENT_PATTERNS.iter() {
            if pattern.regex.is_match(normalized) {
                scores[pattern.intent.index()] += pattern.weight;
            }
        }
        scores
    }
}

fn uniform() -> Vec<f64> {
    vec![1.0 / Intent::ALL.len() as f64; Intent::ALL.len()]
}

fn to_probabilities(scores: &[f64; 10]) -> Vec<f64> {
    let total: f64 = scores.iter().map(|s| s + SMOOTHING).sum();
    scores.iter().map(|s| (s + SMOOTHING) / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unambiguous_translation_is_confident() {
        let p = RulesEngine::new().classify("Translate this paragraph into French");
        assert_eq!(p.intent, Intent::Translation);
        assert!(p.confidence >= 0.90, "confidence {}", p.confidence);
    }

    #[test]
    fn test_unambiguous_code_is_confident() {
        let p = RulesEngine::new().classify("Write a Python function that sorts a list");
        assert_eq!(p.intent, Intent::CodeGeneration);
        assert!(p.confidence >= 0.90);
    }

    #[test]
    fn test_ambiguous_text_has_low_confidence() {
        // Both summarization and translation signals.
        let p = RulesEngine::new().classify("summarize and translate this");
        assert!(p.confidence < 0.80, "confidence {}", p.confidence);
    }

    #[test]
    fn test_no_signal_falls_back_to_conversation() {
        let p = RulesEngine::new().classify("the weather is mild today");
        assert_eq!(p.intent, Intent::Conversation);
        assert_eq!(p.confidence, NO_SIGNAL_CONFIDENCE);
    }

    #[test]
    fn test_greeting() {
        let p = RulesEngine::new().classify("  Hello! ");
        assert_eq!(p.intent, Intent::Conversation);
        assert!(p.confidence >= 0.9);
    }

    #[test]
    fn test_empty_text() {
        let p = RulesEngine::new().classify("   ");
        assert_eq!(p.intent, Intent::Conversation);
        assert_eq!(p.probabilities.len(), Intent::ALL.len());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let p = RulesEngine::new().classify("debug this failing rust test");
        let sum: f64 = p.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let engine = RulesEngine::new();
        let text = "Compare the trade-offs of two caching strategies";
        assert_eq!(engine.classify(text), engine.classify(text));
    }

    proptest::proptest! {
        #[test]
        fn prop_confidence_in_unit_interval(text in "\\PC{0,80}") {
            let p = RulesEngine::new().classify(&text);
            proptest::prop_assert!((0.0..=1.0).contains(&p.confidence));
        }
    }
}
