//! Heuristic complexity determination.
//!
//! Combines structural text signals with the winning tier's output. Low
//! confidence and long text both push toward `Complex`.

use crate::normalize::{normalize, TextFeatures};
use crate::types::{Complexity, Intent, TierPrediction};

/// Phrases that usually mean multi-step work.
const COMPLEX_INDICATORS: &[&str] = &[
    "analyze", "architecture", "compare", "design", "evaluate", "implement",
    "in depth", "in detail", "optimize", "pros and cons", "refactor",
    "step by step", "strategy", "trade-off", "tradeoff", "comprehensive",
];

/// Confidence under which the winning answer is treated as uncertain.
const UNCERTAIN_CONFIDENCE: f64 = 0.6;

/// Derives a [`Complexity`] from text features and a tier prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str, prediction: &TierPrediction) -> Complexity {
        let features = TextFeatures::extract(text);
        let lower = normalize(text);

        let mut score: i32 = Self::length_score(features.token_count);

        if COMPLEX_INDICATORS.iter().any(|c| lower.contains(c)) {
            score += 1;
        }
        if features.code_blocks > 0 {
            score += 1;
        }
        if features.list_items >= 3 || features.sentence_count >= 4 {
            score += 1;
        }
        if features.questions >= 2 {
            score += 1;
        }

        if prediction.confidence < UNCERTAIN_CONFIDENCE {
            score += 1;
        }
        if matches!(prediction.intent, Intent::Reasoning | Intent::DataAnalysis) {
            score += 1;
        }
        if prediction.intent == Intent::Conversation {
            score -= 1;
        }

        match score {
            s if s <= 0 => Complexity::Simple,
            1..=2 => Complexity::Moderate,
            _ => Complexity::Complex,
        }
    }

    fn length_score(token_count: usize) -> i32 {
        match token_count {
            0..=8 => -1,
            9..=40 => 0,
            41..=120 => 1,
            _ => 2,
        }
    }
}
