//! End-to-end cascade behavior against scripted tier backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use triage_core::{ClassificationRequest, Intent, ModelTier, TierPrediction};
use triage_runtime::{
    BackendError, CacheOutcome, CircuitState, ClassificationOrchestrator, EndpointConfig,
    FallbackReason, MemorySink, RuntimeConfig, TierBackend,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Answer(Intent, f64),
    Hang,
    Fail,
}

struct MockTier {
    name: &'static str,
    behavior: Mutex<Behavior>,
    delay: Duration,
    calls: AtomicU32,
}

impl MockTier {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Self::with_delay(name, behavior, Duration::ZERO)
    }

    fn with_delay(name: &'static str, behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior: Mutex::new(behavior),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    fn set(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TierBackend for MockTier {
    async fn classify(&self, _text: &str, _timeout: Duration) -> Result<TierPrediction, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Answer(intent, confidence) => Ok(TierPrediction::new(intent, confidence, vec![])),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BackendError::Timeout(Duration::from_secs(3600)))
            }
            Behavior::Fail => Err(BackendError::Server {
                status: 503,
                message: "unavailable".into(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        self.name
    }
}

struct Harness {
    orchestrator: Arc<ClassificationOrchestrator>,
    rules: Arc<MockTier>,
    zero_shot: Arc<MockTier>,
    distilbert: Arc<MockTier>,
    sink: Arc<MemorySink>,
}

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.request_deadline = Duration::from_secs(5);
    config.retry.max_retries = 0;
    config
}

fn harness(rules: Behavior, zero_shot: Behavior, distilbert: Behavior) -> Harness {
    harness_with(config(), rules, zero_shot, distilbert)
}

fn harness_with(config: RuntimeConfig, rules: Behavior, zero_shot: Behavior, distilbert: Behavior) -> Harness {
    let rules = MockTier::new("rules", rules);
    let zero_shot = MockTier::new("zero_shot", zero_shot);
    let distilbert = MockTier::new("distilbert", distilbert);
    let sink = Arc::new(MemorySink::new());

    let orchestrator = ClassificationOrchestrator::builder()
        .config(config)
        .backend(ModelTier::Rules, rules.clone())
        .backend(ModelTier::ZeroShot, zero_shot.clone())
        .backend(ModelTier::DistilBert, distilbert.clone())
        .event_sink(sink.clone())
        .build()
        .unwrap();

    Harness {
        orchestrator: Arc::new(orchestrator),
        rules,
        zero_shot,
        distilbert,
        sink,
    }
}

fn request(text: &str) -> ClassificationRequest {
    ClassificationRequest::new(text)
}

#[tokio::test]
async fn confident_rules_tier_ends_cascade() {
    let h = harness(
        Behavior::Answer(Intent::Translation, 0.95),
        Behavior::Answer(Intent::Reasoning, 0.99),
        Behavior::Answer(Intent::Reasoning, 0.99),
    );

    let result = h
        .orchestrator
        .classify(&request("Translate this paragraph into German"))
        .await
        .unwrap();

    assert_eq!(result.model_used, ModelTier::Rules);
    assert_eq!(result.intent, Intent::Translation);
    assert!(!result.degraded);
    assert!(!result.cache_hit);
    assert_eq!(h.zero_shot.calls(), 0);
    assert_eq!(h.distilbert.calls(), 0);
}

#[tokio::test]
async fn low_rules_confidence_escalates_to_zero_shot() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::DataAnalysis, 0.85),
        Behavior::Answer(Intent::Reasoning, 0.99),
    );

    let result = h
        .orchestrator
        .classify(&request("What trends show up in last quarter's churn numbers"))
        .await
        .unwrap();

    assert_eq!(result.model_used, ModelTier::ZeroShot);
    assert_eq!(result.intent, Intent::DataAnalysis);
    assert!((result.confidence - 0.85).abs() < 1e-9);
    assert!(!result.degraded);
    assert_eq!(h.rules.calls(), 1);
    assert_eq!(h.distilbert.calls(), 0);

    let event = h.sink.last().unwrap();
    assert_eq!(event.attempts.len(), 2);
    assert_eq!(event.attempts[0].outcome, "below_threshold");
    assert_eq!(event.attempts[1].outcome, "accepted");
}

#[tokio::test]
async fn terminal_tier_is_always_accepted() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::Reasoning, 0.55),
        Behavior::Answer(Intent::Reasoning, 0.61),
    );

    let result = h
        .orchestrator
        .classify(&request("Should we migrate the billing service this quarter"))
        .await
        .unwrap();

    assert_eq!(result.model_used, ModelTier::DistilBert);
    assert!(!result.degraded);
}

#[tokio::test(start_paused = true)]
async fn failing_terminal_tier_opens_breaker_and_leaves_plan() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::Reasoning, 0.50),
        Behavior::Hang,
    );
    let threshold = h.orchestrator.config().circuit_breaker.failure_threshold;

    for i in 0..threshold {
        let result = h
            .orchestrator
            .classify(&request(&format!("Weigh the tradeoffs of option {i}")))
            .await
            .unwrap();
        // DistilBert timed out and nothing else met its threshold.
        assert!(result.degraded);
        assert_eq!(result.model_used, ModelTier::ZeroShot);
    }
    assert_eq!(h.distilbert.calls(), threshold);
    assert_eq!(
        h.orchestrator.breakers().state(ModelTier::DistilBert),
        CircuitState::Open
    );

    let opened = h.sink.last().unwrap();
    assert!(opened
        .breaker_transitions
        .iter()
        .any(|t| t.tier == ModelTier::DistilBert && t.to == CircuitState::Open));

    let plan = h.orchestrator.plan("Weigh the tradeoffs of moving to a monorepo");
    assert_eq!(plan.tiers(), vec![ModelTier::Rules, ModelTier::ZeroShot]);

    // ZeroShot confident again: normal result without DistilBert.
    h.zero_shot.set(Behavior::Answer(Intent::Reasoning, 0.90));
    let result = h
        .orchestrator
        .classify(&request("Weigh the tradeoffs of moving to a monorepo"))
        .await
        .unwrap();
    assert!(!result.degraded);
    assert_eq!(result.model_used, ModelTier::ZeroShot);
    assert_eq!(h.distilbert.calls(), threshold);

    // Nobody confident: best-effort answer, degraded.
    h.zero_shot.set(Behavior::Answer(Intent::Reasoning, 0.50));
    let result = h
        .orchestrator
        .classify(&request("Weigh the tradeoffs of rewriting the parser"))
        .await
        .unwrap();
    assert!(result.degraded);
    assert_eq!(h.sink.last().unwrap().fallback, Some(FallbackReason::BelowThreshold));
}

#[tokio::test(start_paused = true)]
async fn breaker_recovers_after_cool_down() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::Reasoning, 0.50),
        Behavior::Fail,
    );
    let config = h.orchestrator.config().clone();

    for i in 0..config.circuit_breaker.failure_threshold {
        h.orchestrator
            .classify(&request(&format!("Compare approach number {i}")))
            .await
            .unwrap();
    }
    assert_eq!(h.orchestrator.breakers().state(ModelTier::DistilBert), CircuitState::Open);

    tokio::time::advance(config.circuit_breaker.cool_down + Duration::from_millis(1)).await;
    assert_eq!(h.orchestrator.breakers().state(ModelTier::DistilBert), CircuitState::HalfOpen);

    h.distilbert.set(Behavior::Answer(Intent::Reasoning, 0.7));
    let result = h
        .orchestrator
        .classify(&request("Compare the two caching approaches"))
        .await
        .unwrap();
    assert_eq!(result.model_used, ModelTier::DistilBert);
    assert!(!result.degraded);
    assert_eq!(h.orchestrator.breakers().state(ModelTier::DistilBert), CircuitState::Closed);
}

#[tokio::test]
async fn all_breakers_open_forces_degraded_rules() {
    let h = harness(
        Behavior::Answer(Intent::Reasoning, 0.99),
        Behavior::Answer(Intent::Reasoning, 0.99),
        Behavior::Answer(Intent::Reasoning, 0.99),
    );
    let threshold = h.orchestrator.config().circuit_breaker.failure_threshold;
    for tier in ModelTier::CASCADE {
        let breaker = h.orchestrator.breakers().get(tier).unwrap();
        for _ in 0..threshold {
            breaker.try_acquire().unwrap().failure();
        }
    }

    let plan = h.orchestrator.plan("Translate this paragraph into Spanish");
    assert!(plan.forced);
    assert_eq!(plan.tiers(), vec![ModelTier::Rules]);

    let result = h
        .orchestrator
        .classify(&request("Translate this paragraph into Spanish"))
        .await
        .unwrap();
    assert!(result.degraded);
    assert_eq!(result.model_used, ModelTier::Rules);
    assert_eq!(result.intent, Intent::Translation);
    assert_eq!(h.rules.calls() + h.zero_shot.calls() + h.distilbert.calls(), 0);
    assert_eq!(h.sink.last().unwrap().fallback, Some(FallbackReason::ForcedPlan));
}

#[tokio::test]
async fn every_tier_failing_falls_back_to_local_rules() {
    let h = harness(Behavior::Fail, Behavior::Fail, Behavior::Fail);

    let result = h
        .orchestrator
        .classify(&request("Write a Python function that reverses a list"))
        .await
        .unwrap();

    assert!(result.degraded);
    assert_eq!(result.model_used, ModelTier::Rules);
    assert_eq!(result.intent, Intent::CodeGeneration);
    assert!((0.0..=1.0).contains(&result.confidence));

    let event = h.sink.last().unwrap();
    assert_eq!(event.fallback, Some(FallbackReason::AllTiersExhausted));
    assert_eq!(event.attempts.last().unwrap().outcome, "local_fallback");
}

#[tokio::test(start_paused = true)]
async fn deadline_cuts_cascade_short() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Hang,
        Behavior::Answer(Intent::Reasoning, 0.99),
    );

    let started = tokio::time::Instant::now();
    let result = h
        .orchestrator
        .classify_with_deadline(
            &request("Help me think about this architecture"),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert!(started.elapsed() <= Duration::from_millis(100));
    assert!(result.degraded);
    assert_eq!(result.model_used, ModelTier::Rules);
    assert_eq!(h.distilbert.calls(), 0);
    assert_eq!(h.sink.last().unwrap().fallback, Some(FallbackReason::DeadlineExceeded));
}

#[tokio::test]
async fn repeated_text_is_served_from_cache() {
    let h = harness(
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::Summarization, 0.88),
        Behavior::Answer(Intent::Reasoning, 0.99),
    );

    let first = h
        .orchestrator
        .classify(&request("Summarize the attached meeting notes"))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .classify(&request("  summarize THE attached   meeting notes "))
        .await
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert!(first.same_classification(&second));
    assert_eq!(h.rules.calls(), 1);
    assert_eq!(h.zero_shot.calls(), 1);
    assert_eq!(h.sink.last().unwrap().cache, CacheOutcome::Hit);
}

#[tokio::test]
async fn degraded_results_are_not_cached() {
    let h = harness(Behavior::Fail, Behavior::Fail, Behavior::Fail);

    for _ in 0..2 {
        let result = h
            .orchestrator
            .classify(&request("Debug why this service keeps crashing"))
            .await
            .unwrap();
        assert!(!result.cache_hit);
    }
    assert_eq!(h.rules.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_run_one_cascade() {
    let rules = MockTier::with_delay(
        "rules",
        Behavior::Answer(Intent::Conversation, 0.40),
        Duration::from_millis(50),
    );
    let zero_shot = MockTier::with_delay(
        "zero_shot",
        Behavior::Answer(Intent::CreativeWriting, 0.90),
        Duration::from_millis(50),
    );
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Arc::new(
        ClassificationOrchestrator::builder()
            .config(config())
            .backend(ModelTier::Rules, rules.clone())
            .backend(ModelTier::ZeroShot, zero_shot.clone())
            .backend(
                ModelTier::DistilBert,
                MockTier::new("distilbert", Behavior::Answer(Intent::Reasoning, 0.99)),
            )
            .event_sink(sink.clone())
            .build()
            .unwrap(),
    );

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .classify(&ClassificationRequest::new("Write a short poem about autumn rain"))
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    assert_eq!(rules.calls(), 1);
    assert_eq!(zero_shot.calls(), 1);
    assert!(results.iter().all(|r| r.same_classification(&results[0])));
    assert_eq!(results[0].model_used, ModelTier::ZeroShot);

    let events = sink.events();
    assert_eq!(events.len(), 10);
    assert_eq!(events.iter().filter(|e| e.cache == CacheOutcome::Miss).count(), 1);
    assert_eq!(orchestrator.cache().in_flight_count(), 0);
}

#[tokio::test]
async fn classification_is_idempotent() {
    let mut config = config();
    config.cache.enabled = false;
    let h = harness_with(
        config,
        Behavior::Answer(Intent::Conversation, 0.40),
        Behavior::Answer(Intent::TechnicalWriting, 0.82),
        Behavior::Answer(Intent::Reasoning, 0.99),
    );

    let text = "Document the public API of the payments module";
    let first = h.orchestrator.classify(&request(text)).await.unwrap();
    let second = h.orchestrator.classify(&request(text)).await.unwrap();

    assert!(first.same_classification(&second));
    assert!(!second.cache_hit);
    assert_eq!(h.zero_shot.calls(), 2);
    assert_eq!(h.sink.last().unwrap().cache, CacheOutcome::Bypass);
}

#[tokio::test]
async fn http_tiers_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predictions/zero_shot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "label": "question_answering",
            "confidence": 0.86,
            "probabilities": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = RuntimeConfig::default();
    config.request_deadline = Duration::from_secs(2);
    // Force escalation past the local rules tier.
    config.tiers.rules.stop_confidence = 1.0;
    config.tiers.zero_shot.endpoint = EndpointConfig::http(server.uri(), "zero_shot");
    config.tiers.zero_shot.timeout = Duration::from_secs(1);
    config.tiers.distilbert.endpoint = EndpointConfig::http(server.uri(), "distilbert");

    let orchestrator = ClassificationOrchestrator::builder().config(config).build().unwrap();
    let result = orchestrator
        .classify(&request("Who designed the first mechanical computer?"))
        .await
        .unwrap();

    assert_eq!(result.model_used, ModelTier::ZeroShot);
    assert_eq!(result.intent, Intent::QuestionAnswering);
    assert!(!result.degraded);

    let health = orchestrator.health().await;
    assert_eq!(health.tiers.len(), 3);
    assert!(health.tiers.iter().all(|t| t.reachable));
}

#[tokio::test(start_paused = true)]
async fn waiter_answers_locally_when_its_deadline_lapses() {
    let mut config = config();
    config.tiers.zero_shot.timeout = Duration::from_secs(2);
    let zero_shot = MockTier::with_delay(
        "zero_shot",
        Behavior::Answer(Intent::DataAnalysis, 0.90),
        Duration::from_secs(1),
    );
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Arc::new(
        ClassificationOrchestrator::builder()
            .config(config)
            .backend(
                ModelTier::Rules,
                MockTier::new("rules", Behavior::Answer(Intent::Conversation, 0.40)),
            )
            .backend(ModelTier::ZeroShot, zero_shot.clone())
            .backend(
                ModelTier::DistilBert,
                MockTier::new("distilbert", Behavior::Answer(Intent::Reasoning, 0.99)),
            )
            .event_sink(sink.clone())
            .build()
            .unwrap(),
    );
    let text = "Chart the monthly revenue by region";

    let leader = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.classify(&ClassificationRequest::new(text)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = tokio::time::Instant::now();
    let waited = orchestrator
        .classify_with_deadline(&request(text), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(started.elapsed() <= Duration::from_millis(50));
    assert!(waited.degraded);
    assert!(!waited.cache_hit);
    assert_eq!(waited.model_used, ModelTier::Rules);

    let event = sink.last().unwrap();
    assert_eq!(event.fallback, Some(FallbackReason::DeadlineExceeded));
    assert_eq!(event.cache, CacheOutcome::Coalesced);

    let led = leader.await.unwrap().unwrap();
    assert!(!led.degraded);
    assert_eq!(led.model_used, ModelTier::ZeroShot);
    assert_eq!(zero_shot.calls(), 1);
}
