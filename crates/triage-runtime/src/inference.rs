//! Breaker-guarded, deadline-bounded calls to a single tier.
//!
//! One [`InferenceClient::classify`] call makes up to `1 + max_retries`
//! attempts against one tier's backend. Every attempt:
//! - goes through the tier's circuit breaker,
//! - is timed out at the tier timeout clamped to the request deadline,
//! - reports its outcome to the breaker (transient failures only).
//!
//! A retry starts only when the remaining budget covers the backoff delay
//! plus a full attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use triage_core::{ModelTier, TierPrediction};

use crate::backends::{BackendError, TierBackend};
use crate::config::{RetryConfig, TierConfigs};
use crate::resilience::{BreakerOpenError, BreakerRegistry, CircuitState, Deadline};

/// Errors from one tier call.
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    /// Retryable failure; the next tier may still answer.
    #[error("{tier}: transient failure after {attempts} attempt(s): {source}")]
    Transient {
        tier: ModelTier,
        source: BackendError,
        attempts: u32,
    },

    /// The backend rejected the input. Not retried, not reported to the
    /// breaker.
    #[error("{tier}: request rejected: {source}")]
    Permanent { tier: ModelTier, source: BackendError },

    #[error(transparent)]
    BreakerOpen(#[from] BreakerOpenError),

    /// No budget left to start an attempt.
    #[error("{tier}: request deadline exhausted")]
    DeadlineExceeded { tier: ModelTier },

    #[error("no backend registered for tier {0}")]
    NoBackend(ModelTier),
}

impl InferenceError {
    pub fn tier(&self) -> ModelTier {
        match self {
            InferenceError::Transient { tier, .. }
            | InferenceError::Permanent { tier, .. }
            | InferenceError::DeadlineExceeded { tier } => *tier,
            InferenceError::BreakerOpen(e) => e.tier,
            InferenceError::NoBackend(tier) => *tier,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, InferenceError::Permanent { .. })
    }

    /// Short outcome label for logs and events.
    pub fn outcome(&self) -> &'static str {
        match self {
            InferenceError::Transient { .. } => "transient_error",
            InferenceError::Permanent { .. } => "permanent_error",
            InferenceError::BreakerOpen(_) => "breaker_open",
            InferenceError::DeadlineExceeded { .. } => "deadline_exceeded",
            InferenceError::NoBackend(_) => "no_backend",
        }
    }
}

/// Liveness of one tier, as reported by [`InferenceClient::health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierHealth {
    pub tier: ModelTier,
    pub backend: String,
    pub reachable: bool,
    pub breaker: CircuitState,
}

/// Calls tier backends through their breakers.
pub struct InferenceClient {
    backends: HashMap<ModelTier, Arc<dyn TierBackend>>,
    breakers: Arc<BreakerRegistry>,
    tiers: TierConfigs,
    retry: RetryConfig,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tiers: Vec<_> = self.backends.keys().collect();
        tiers.sort();
        f.debug_struct("InferenceClient")
            .field("tiers", &tiers)
            .field("retry", &self.retry)
            .finish()
    }
}

impl InferenceClient {
    pub fn new(
        backends: HashMap<ModelTier, Arc<dyn TierBackend>>,
        breakers: Arc<BreakerRegistry>,
        tiers: TierConfigs,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backends,
            breakers,
            tiers,
            retry,
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn has_backend(&self, tier: ModelTier) -> bool {
        self.backends.contains_key(&tier)
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.retry.base_delay)
            .with_max_delay(self.retry.max_delay)
            .with_factor(self.retry.factor)
            .with_max_times(self.retry.max_retries as usize);
        if self.retry.jitter {
            builder = builder.with_jitter();
        }
        builder.build()
    }

    /// Classify `text` with one tier.
    pub async fn classify(
        &self,
        text: &str,
        tier: ModelTier,
        deadline: &Deadline,
    ) -> Result<TierPrediction, InferenceError> {
        let backend = self
            .backends
            .get(&tier)
            .ok_or(InferenceError::NoBackend(tier))?;
        let breaker = self.breakers.get(tier);
        let attempt_timeout = self.tiers.get(tier).timeout;
        let mut delays = self.backoff();
        let mut attempts: u32 = 0;
        let mut last_error: Option<BackendError> = None;

        loop {
            let timeout = deadline.clamp(attempt_timeout);
            if timeout.is_zero() {
                return Err(match last_error {
                    Some(source) => InferenceError::Transient { tier, source, attempts },
                    None => InferenceError::DeadlineExceeded { tier },
                });
            }

            let permit = match breaker.map(|b| b.try_acquire()).transpose() {
                Ok(permit) => permit,
                // The breaker opened between retries.
                Err(open) => {
                    return Err(match last_error {
                        Some(source) => InferenceError::Transient { tier, source, attempts },
                        None => InferenceError::BreakerOpen(open),
                    });
                }
            };

            attempts += 1;
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, backend.classify(text, timeout)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let err = match outcome {
                Ok(prediction) => {
                    if let Some(permit) = permit {
                        permit.success();
                    }
                    tracing::debug!(
                        tier = %tier,
                        attempt = attempts,
                        latency_ms,
                        outcome = "success",
                        intent = %prediction.intent,
                        confidence = prediction.confidence,
                        "Tier call completed"
                    );
                    return Ok(prediction);
                }
                Err(err) if !err.is_transient() => {
                    if let Some(permit) = permit {
                        permit.release();
                    }
                    tracing::warn!(
                        tier = %tier,
                        attempt = attempts,
                        latency_ms,
                        outcome = "permanent_error",
                        error = %err,
                        "Tier rejected request"
                    );
                    return Err(InferenceError::Permanent { tier, source: err });
                }
                Err(err) => err,
            };

            if let Some(permit) = permit {
                permit.failure();
            }
            tracing::warn!(
                tier = %tier,
                attempt = attempts,
                latency_ms,
                outcome = "transient_error",
                error = %err,
                "Tier call failed"
            );

            let Some(delay) = delays.next() else {
                return Err(InferenceError::Transient { tier, source: err, attempts });
            };
            if !deadline.can_afford(delay + attempt_timeout) {
                tracing::debug!(
                    tier = %tier,
                    delay = ?delay,
                    remaining = ?deadline.remaining(),
                    "Not enough budget left to retry"
                );
                return Err(InferenceError::Transient { tier, source: err, attempts });
            }

            last_error = Some(err);
            tokio::time::sleep(delay).await;
        }
    }

    /// Probe every backend concurrently. Off the request path.
    pub async fn health(&self) -> Vec<TierHealth> {
        let mut tiers: Vec<_> = self.backends.iter().collect();
        tiers.sort_by_key(|(tier, _)| **tier);

        let probes = tiers.into_iter().map(|(tier, backend)| async move {
            TierHealth {
                tier: *tier,
                backend: backend.name().to_string(),
                reachable: backend.health_check().await,
                breaker: self.breakers.state(*tier),
            }
        });
        join_all(probes).await
    }
}
