//! Core types for Triage classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::techniques::Technique;

/// Task category a piece of user input is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeGeneration,
    Debugging,
    DataAnalysis,
    CreativeWriting,
    TechnicalWriting,
    Summarization,
    Translation,
    QuestionAnswering,
    Reasoning,
    Conversation,
}

impl Intent {
    /// All intents, in the order backends report probabilities.
    pub const ALL: [Intent; 10] = [
        Intent::CodeGeneration,
        Intent::Debugging,
        Intent::DataAnalysis,
        Intent::CreativeWriting,
        Intent::TechnicalWriting,
        Intent::Summarization,
        Intent::Translation,
        Intent::QuestionAnswering,
        Intent::Reasoning,
        Intent::Conversation,
    ];

    /// Wire label for this intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CodeGeneration => "code_generation",
            Intent::Debugging => "debugging",
            Intent::DataAnalysis => "data_analysis",
            Intent::CreativeWriting => "creative_writing",
            Intent::TechnicalWriting => "technical_writing",
            Intent::Summarization => "summarization",
            Intent::Translation => "translation",
            Intent::QuestionAnswering => "question_answering",
            Intent::Reasoning => "reasoning",
            Intent::Conversation => "conversation",
        }
    }

    /// Position of this intent in [`Intent::ALL`].
    pub fn index(&self) -> usize {
        Intent::ALL
            .iter()
            .position(|i| i == self)
            .unwrap_or(Intent::ALL.len() - 1)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend label does not name a known intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent label: '{0}'")]
pub struct UnknownIntent(pub String);

impl FromStr for Intent {
    type Err = UnknownIntent;

    /// Parse a backend label. Matching ignores case and treats `-`, ` `
    /// and `_` as the same separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        Intent::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == normalized)
            .ok_or_else(|| UnknownIntent(s.to_string()))
    }
}

/// A classification strategy with its own cost/accuracy/latency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Keyword and pattern rules. Cheapest tier.
    Rules,
    /// Zero-shot NLI model.
    ZeroShot,
    /// Fine-tuned DistilBERT. Terminal tier of the cascade.
    #[serde(rename = "distilbert")]
    DistilBert,
    /// Composite label for the cascade as a whole. Never a backend.
    Hybrid,
}

impl ModelTier {
    /// The backend tiers, cheapest first. This is the default cascade order.
    pub const CASCADE: [ModelTier; 3] = [ModelTier::Rules, ModelTier::ZeroShot, ModelTier::DistilBert];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Rules => "rules",
            ModelTier::ZeroShot => "zero_shot",
            ModelTier::DistilBert => "distilbert",
            ModelTier::Hybrid => "hybrid",
        }
    }

    /// Whether this tier is served by a real backend.
    pub fn is_backend(&self) -> bool {
        !matches!(self, ModelTier::Hybrid)
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How demanding a request is to fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// An inbound classification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Free-text user input
    pub text: String,

    /// Opaque caller identifier, used for metrics only
    #[serde(default = "default_subject")]
    pub subject_id: String,

    /// Correlation id
    #[serde(default = "new_request_id")]
    pub request_id: String,
}

fn default_subject() -> String {
    "anonymous".to_string()
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ClassificationRequest {
    /// Create a request with a fresh correlation id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            subject_id: default_subject(),
            request_id: new_request_id(),
        }
    }

    /// Set the caller identifier.
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = subject_id.into();
        self
    }

    /// Set the correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// The part of a classification a single tier produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPrediction {
    pub intent: Intent,

    /// Always within [0, 1]
    pub confidence: f64,

    /// Raw per-intent probabilities as reported by the tier
    #[serde(default)]
    pub probabilities: Vec<f64>,
}

impl TierPrediction {
    /// Build a prediction, clamping the confidence into [0, 1].
    pub fn new(intent: Intent, confidence: f64, probabilities: Vec<f64>) -> Self {
        Self {
            intent,
            confidence: clamp_confidence(confidence),
            probabilities,
        }
    }
}

/// Clamp a confidence value into [0, 1]. NaN maps to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Final classification returned to the caller.
///
/// Immutable once built; cached by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,

    /// Always within [0, 1]
    pub confidence: f64,

    pub complexity: Complexity,

    /// Ordered, duplicate-free
    pub suggested_techniques: Vec<Technique>,

    /// Tier that actually produced the answer
    pub model_used: ModelTier,

    /// True when produced under a forced or fallback path
    pub degraded: bool,

    pub cache_hit: bool,

    pub latency_ms: u64,
}

impl ClassificationResult {
    /// Copy of this result as served from cache.
    pub fn served_from_cache(&self, latency_ms: u64) -> Self {
        Self {
            cache_hit: true,
            latency_ms,
            ..self.clone()
        }
    }

    /// Equality that ignores `latency_ms` and `cache_hit`.
    pub fn same_classification(&self, other: &Self) -> bool {
        self.intent == other.intent
            && self.confidence == other.confidence
            && self.complexity == other.complexity
            && self.suggested_techniques == other.suggested_techniques
            && self.model_used == other.model_used
            && self.degraded == other.degraded
    }
}
