//! Per-request classification events.
//!
//! Every finished request produces one [`ClassificationEvent`] describing
//! what the cascade did: tiers attempted, cache outcome, breaker
//! transitions it observed, and where the time went. Events go to an
//! [`EventSink`]; the default sink logs them through `tracing`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use triage_core::{Intent, ModelTier};

use crate::cache::CacheOutcome;
use crate::resilience::{BreakerSnapshot, CircuitState, FallbackReason};

/// One call to one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAttempt {
    pub tier: ModelTier,

    /// `success`, `below_threshold`, `transient_error`, `breaker_open`, ...
    pub outcome: String,

    pub latency_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A breaker whose state changed while the request was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerTransition {
    pub tier: ModelTier,
    pub from: CircuitState,
    pub to: CircuitState,
}

impl BreakerTransition {
    /// Pair up two registry snapshots and keep the tiers that changed.
    pub fn between(before: &[BreakerSnapshot], after: &[BreakerSnapshot]) -> Vec<Self> {
        before
            .iter()
            .filter_map(|b| {
                let a = after.iter().find(|a| a.tier == b.tier)?;
                (a.state != b.state).then_some(BreakerTransition {
                    tier: b.tier,
                    from: b.state,
                    to: a.state,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageLatencies {
    pub cache_lookup_ms: u64,
    pub cascade_ms: u64,
    pub post_process_ms: u64,
}

/// Structured record of one classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationEvent {
    pub request_id: String,
    pub subject_id: String,
    pub timestamp: DateTime<Utc>,

    pub planned: Vec<ModelTier>,
    pub forced: bool,
    pub fast_path: bool,
    pub attempts: Vec<TierAttempt>,

    pub final_tier: ModelTier,
    pub intent: Intent,
    pub confidence: f64,
    pub degraded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,

    pub cache: CacheOutcome,
    pub breaker_transitions: Vec<BreakerTransition>,

    pub latency_ms: u64,
    pub stages: StageLatencies,
}

/// Destination for classification events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ClassificationEvent);
}

/// Logs each event at `info`, with the full event as JSON at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ClassificationEvent) {
        tracing::info!(
            request_id = %event.request_id,
            subject_id = %event.subject_id,
            intent = %event.intent,
            confidence = event.confidence,
            model_used = %event.final_tier,
            degraded = event.degraded,
            cache = event.cache.as_str(),
            attempts = event.attempts.len(),
            latency_ms = event.latency_ms,
            "Classification complete"
        );
        for transition in &event.breaker_transitions {
            tracing::info!(
                request_id = %event.request_id,
                tier = %transition.tier,
                from = %transition.from,
                to = %transition.to,
                "Breaker transition observed"
            );
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(event) {
                Ok(json) => tracing::debug!(event = %json, "Classification event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize classification event"),
            }
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ClassificationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClassificationEvent> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<ClassificationEvent> {
        self.events.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ClassificationEvent) {
        self.events.lock().push(event.clone());
    }
}
