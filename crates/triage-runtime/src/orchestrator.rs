//! Classification orchestrator.
//!
//! The orchestrator is the single entry point for a classification. Per
//! request it:
//! - validates the input and looks it up in the response cache,
//! - on a miss, runs the cascade once per key (single-flight): plan, then
//!   call tiers cheapest-first until one is confident enough,
//! - falls back to the in-process rules engine when no tier can answer,
//! - derives complexity and techniques, writes the cache and emits an event.
//!
//! Backend instability never reaches the caller. The only errors returned
//! are for bad input.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use triage_core::{
    build_result, ClassificationRequest, ClassificationResult, ModelTier, RulesEngine,
    TierPrediction,
};

use crate::backends::{BackendError, BackendRegistry, TierBackend};
use crate::cache::{CacheBackend, CacheKey, CacheOutcome, Computed, MemoryBackend, ResponseCache};
use crate::config::{ConfigError, RuntimeConfig};
use crate::events::{
    BreakerTransition, ClassificationEvent, EventSink, StageLatencies, TierAttempt, TracingSink,
};
use crate::inference::{InferenceClient, InferenceError, TierHealth};
use crate::resilience::{BreakerRegistry, BreakerSnapshot, Deadline, FallbackReason};
use crate::router::{CascadePlan, StrategyRouter};

/// Errors returned to callers of [`ClassificationOrchestrator::classify`].
///
/// Both variants are permanent: retrying the same request will not help.
#[derive(Error, Debug, Clone)]
pub enum ClassifyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request rejected by {tier} backend: {source}")]
    Rejected { tier: ModelTier, source: BackendError },
}

/// Errors building an orchestrator.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create {tier} backend: {source}")]
    Backend { tier: ModelTier, source: BackendError },
}

/// Snapshot of backend reachability and breaker state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub version: String,
    pub tiers: Vec<TierHealth>,
    pub breakers: Vec<BreakerSnapshot>,
}

/// Everything the cascade learned while computing one result.
struct CascadeRun {
    result: ClassificationResult,
    plan: CascadePlan,
    attempts: Vec<TierAttempt>,
    fallback: Option<FallbackReason>,
    cascade_ms: u64,
    post_process_ms: u64,
}

/// Top-level classification service.
///
/// Owns the breaker registry, cache and backends for its lifetime. Cheap
/// to share behind an `Arc`; every method takes `&self`.
pub struct ClassificationOrchestrator {
    config: RuntimeConfig,
    version: String,
    router: StrategyRouter,
    client: InferenceClient,
    breakers: Arc<BreakerRegistry>,
    cache: ResponseCache,
    rules: RulesEngine,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ClassificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationOrchestrator")
            .field("version", &self.version)
            .field("client", &self.client)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClassificationOrchestrator {
    pub fn builder() -> ClassificationOrchestratorBuilder {
        ClassificationOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Configuration version tag used in cache keys.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Plan the cascade for `text` against current breaker health, without
    /// running it.
    pub fn plan(&self, text: &str) -> CascadePlan {
        self.router.plan(text, &self.breakers)
    }

    /// Classify with the configured request deadline.
    pub async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifyError> {
        self.classify_with_deadline(request, self.config.request_deadline)
            .await
    }

    /// Classify within `budget`.
    pub async fn classify_with_deadline(
        &self,
        request: &ClassificationRequest,
        budget: Duration,
    ) -> Result<ClassificationResult, ClassifyError> {
        let span = tracing::info_span!(
            "classify",
            request_id = %request.request_id,
            subject_id = %request.subject_id,
        );
        self.classify_inner(request, budget).instrument(span).await
    }

    async fn classify_inner(
        &self,
        request: &ClassificationRequest,
        budget: Duration,
    ) -> Result<ClassificationResult, ClassifyError> {
        let started = Instant::now();
        self.validate(&request.text)?;

        let deadline = Deadline::after(budget);
        let key = CacheKey::new(&request.text, &self.version);
        let breakers_before = self.breakers.snapshot();

        if let Some(hit) = self.cache.get(&key).await {
            let result = hit.served_from_cache(elapsed_ms(started));
            tracing::debug!(key = %key, "Cache hit");
            self.emit(
                request,
                &result,
                None,
                CacheOutcome::Hit,
                &breakers_before,
                StageLatencies {
                    cache_lookup_ms: result.latency_ms,
                    ..StageLatencies::default()
                },
            );
            return Ok(result);
        }
        let cache_lookup_ms = elapsed_ms(started);

        let text = request.text.as_str();
        let computed = self
            .cache
            .get_or_compute(&key, &deadline, || async move {
                let run = self.run_cascade(text, &deadline, started).await?;
                Ok::<_, ClassifyError>((run.result.clone(), run))
            })
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Classification rejected"))?;

        // Callers served by another caller's cascade carry no attempts.
        let (result, outcome, run) = match computed {
            Computed::Ready {
                result,
                outcome: CacheOutcome::Hit,
                meta,
            } => (result.served_from_cache(elapsed_ms(started)), CacheOutcome::Hit, meta),
            Computed::Ready {
                result,
                outcome,
                meta,
            } => (result, outcome, meta),
            Computed::TimedOut => {
                let run = self.waiter_fallback(text, started);
                (run.result.clone(), CacheOutcome::Coalesced, Some(run))
            }
        };

        let stages = StageLatencies {
            cache_lookup_ms,
            cascade_ms: run.as_ref().map_or(0, |r| r.cascade_ms),
            post_process_ms: run.as_ref().map_or(0, |r| r.post_process_ms),
        };
        self.emit(request, &result, run.as_ref(), outcome, &breakers_before, stages);

        Ok(result)
    }

    fn validate(&self, text: &str) -> Result<(), ClassifyError> {
        if text.trim().is_empty() {
            return Err(ClassifyError::InvalidRequest("text is empty".into()));
        }
        let chars = text.chars().count();
        if chars > self.config.max_text_chars {
            return Err(ClassifyError::InvalidRequest(format!(
                "text has {chars} characters, limit is {}",
                self.config.max_text_chars
            )));
        }
        Ok(())
    }

    /// Plan and run the cascade, then post-process the winning prediction.
    async fn run_cascade(
        &self,
        text: &str,
        deadline: &Deadline,
        started: Instant,
    ) -> Result<CascadeRun, ClassifyError> {
        let cascade_started = Instant::now();
        let plan = self.router.plan(text, &self.breakers);
        let mut attempts = Vec::with_capacity(plan.len());
        let mut best: Option<(ModelTier, TierPrediction)> = None;
        let mut accepted = false;
        let mut cut_short = false;

        if !plan.forced {
            for step in &plan.steps {
                if deadline.is_expired() {
                    cut_short = true;
                    break;
                }

                let attempt_started = Instant::now();
                let outcome = self.client.classify(text, step.tier, deadline).await;
                let latency_ms = elapsed_ms(attempt_started);

                match outcome {
                    Ok(prediction) => {
                        let met = prediction.confidence >= step.stop_confidence;
                        attempts.push(TierAttempt {
                            tier: step.tier,
                            outcome: if met { "accepted" } else { "below_threshold" }.to_string(),
                            latency_ms,
                            confidence: Some(prediction.confidence),
                        });
                        let better = best
                            .as_ref()
                            .map_or(true, |(_, b)| prediction.confidence >= b.confidence);
                        if met || better {
                            best = Some((step.tier, prediction));
                        }
                        if met {
                            accepted = true;
                            break;
                        }
                    }
                    Err(InferenceError::Permanent { tier, source }) => {
                        return Err(ClassifyError::Rejected { tier, source });
                    }
                    Err(err) => {
                        attempts.push(TierAttempt {
                            tier: step.tier,
                            outcome: err.outcome().to_string(),
                            latency_ms,
                            confidence: None,
                        });
                        if matches!(err, InferenceError::DeadlineExceeded { .. }) {
                            cut_short = true;
                            break;
                        }
                    }
                }
            }
        }

        let deadline_or = |otherwise| {
            if cut_short {
                FallbackReason::DeadlineExceeded
            } else {
                otherwise
            }
        };
        // `local` marks a prediction from the in-process engine rather
        // than from a tier call.
        let (model_used, prediction, fallback, local) = match best {
            _ if plan.forced => (
                ModelTier::Rules,
                self.rules.classify(text),
                Some(FallbackReason::ForcedPlan),
                true,
            ),
            Some((tier, prediction)) if accepted => (tier, prediction, None, false),
            Some((tier, prediction)) => (
                tier,
                prediction,
                Some(deadline_or(FallbackReason::BelowThreshold)),
                false,
            ),
            None => (
                ModelTier::Rules,
                self.rules.classify(text),
                Some(deadline_or(FallbackReason::AllTiersExhausted)),
                true,
            ),
        };

        if local {
            attempts.push(TierAttempt {
                tier: ModelTier::Rules,
                outcome: "local_fallback".to_string(),
                latency_ms: 0,
                confidence: Some(prediction.confidence),
            });
        }
        if let Some(reason) = fallback {
            tracing::warn!(
                reason = %reason,
                model_used = %model_used,
                confidence = prediction.confidence,
                "Returning degraded classification"
            );
        }
        let cascade_ms = elapsed_ms(cascade_started);

        let post_started = Instant::now();
        let mut result = build_result(text, &prediction, model_used, fallback.is_some(), 0);
        let post_process_ms = elapsed_ms(post_started);
        result.latency_ms = elapsed_ms(started);

        Ok(CascadeRun {
            result,
            plan,
            attempts,
            fallback,
            cascade_ms,
            post_process_ms,
        })
    }

    /// Answer for a caller whose deadline lapsed while another caller's
    /// cascade for the same key was still running.
    fn waiter_fallback(&self, text: &str, started: Instant) -> CascadeRun {
        let plan = self.router.plan(text, &self.breakers);
        let prediction = self.rules.classify(text);
        tracing::warn!(
            reason = %FallbackReason::DeadlineExceeded,
            confidence = prediction.confidence,
            "Deadline lapsed waiting on in-flight classification, answering locally"
        );

        let post_started = Instant::now();
        let mut result = build_result(text, &prediction, ModelTier::Rules, true, 0);
        let post_process_ms = elapsed_ms(post_started);
        result.latency_ms = elapsed_ms(started);

        CascadeRun {
            result,
            plan,
            attempts: vec![TierAttempt {
                tier: ModelTier::Rules,
                outcome: "local_fallback".to_string(),
                latency_ms: 0,
                confidence: Some(prediction.confidence),
            }],
            fallback: Some(FallbackReason::DeadlineExceeded),
            cascade_ms: 0,
            post_process_ms,
        }
    }

    fn emit(
        &self,
        request: &ClassificationRequest,
        result: &ClassificationResult,
        run: Option<&CascadeRun>,
        cache: CacheOutcome,
        breakers_before: &[BreakerSnapshot],
        stages: StageLatencies,
    ) {
        let breakers_after = self.breakers.snapshot();
        let event = ClassificationEvent {
            request_id: request.request_id.clone(),
            subject_id: request.subject_id.clone(),
            timestamp: Utc::now(),
            planned: run.map(|r| r.plan.tiers()).unwrap_or_default(),
            forced: run.is_some_and(|r| r.plan.forced),
            fast_path: run.is_some_and(|r| r.plan.fast_path),
            attempts: run.map(|r| r.attempts.clone()).unwrap_or_default(),
            final_tier: result.model_used,
            intent: result.intent,
            confidence: result.confidence,
            degraded: result.degraded,
            fallback: run.and_then(|r| r.fallback),
            cache,
            breaker_transitions: BreakerTransition::between(breakers_before, &breakers_after),
            latency_ms: result.latency_ms,
            stages,
        };
        self.sink.emit(&event);
    }

    /// Probe every backend and report breaker state. Off the request path.
    pub async fn health(&self) -> HealthReport {
        HealthReport {
            version: self.version.clone(),
            tiers: self.client.health().await,
            breakers: self.breakers.snapshot(),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Builder for [`ClassificationOrchestrator`].
///
/// Backends not supplied explicitly are created from the tier endpoints in
/// the configuration.
pub struct ClassificationOrchestratorBuilder {
    config: RuntimeConfig,
    backends: HashMap<ModelTier, Arc<dyn TierBackend>>,
    registry: Option<BackendRegistry>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    breakers: Option<Arc<BreakerRegistry>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ClassificationOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            backends: HashMap::new(),
            registry: None,
            cache_backend: None,
            breakers: None,
            sink: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `backend` for `tier` instead of the configured endpoint.
    pub fn backend(mut self, tier: ModelTier, backend: Arc<dyn TierBackend>) -> Self {
        self.backends.insert(tier, backend);
        self
    }

    /// Factories for configured endpoints. Defaults to
    /// [`BackendRegistry::with_defaults`].
    pub fn backend_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cache storage. Defaults to an in-memory backend.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Share a breaker registry. Defaults to a fresh one from the config.
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Event destination. Defaults to [`TracingSink`].
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ClassificationOrchestrator, BuildError> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(BackendRegistry::with_defaults);
        let mut backends = self.backends;
        for tier in ModelTier::CASCADE {
            if backends.contains_key(&tier) {
                continue;
            }
            let backend = registry
                .create(tier, &config.tiers.get(tier).endpoint)
                .map_err(|source| BuildError::Backend { tier, source })?;
            backends.insert(tier, backend);
        }

        let breakers = self
            .breakers
            .unwrap_or_else(|| Arc::new(BreakerRegistry::new(config.circuit_breaker.clone())));
        let cache_backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new(config.cache.max_entries)));
        let version = config.version_tag();

        tracing::info!(
            version = %version,
            deadline = ?config.request_deadline,
            cache_enabled = config.cache.enabled,
            "Classification orchestrator ready"
        );

        Ok(ClassificationOrchestrator {
            router: StrategyRouter::new(config.tiers.clone(), config.router.clone()),
            client: InferenceClient::new(
                backends,
                breakers.clone(),
                config.tiers.clone(),
                config.retry.clone(),
            ),
            cache: ResponseCache::new(cache_backend, config.cache.clone()),
            breakers,
            rules: RulesEngine::new(),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            version,
            config,
        })
    }
}

impl Default for ClassificationOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
