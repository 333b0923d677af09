//! # triage-runtime
//!
//! Cascading intent classification for Triage.
//!
//! `triage-core` answers from keyword rules alone. This crate puts those
//! rules in front of progressively more expensive model tiers and keeps the
//! whole thing available when those tiers are not:
//! - a per-request cascade plan that skips tiers with open breakers,
//! - retries bounded by the request deadline,
//! - a response cache with single-flight misses,
//! - a local rules fallback when no tier can answer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use triage_core::ClassificationRequest;
//! use triage_runtime::{ClassificationOrchestrator, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("triage.yaml")?;
//! let orchestrator = ClassificationOrchestrator::builder().config(config).build()?;
//!
//! let result = orchestrator
//!     .classify(&ClassificationRequest::new("Fix the off-by-one in this loop"))
//!     .await?;
//! println!("{} via {}", result.intent, result.model_used);
//! ```

pub mod backends;
pub mod cache;
pub mod config;
pub mod events;
pub mod inference;
pub mod orchestrator;
pub mod resilience;
pub mod router;

pub use backends::{
    BackendCredential, BackendError, BackendFactory, BackendRegistry, HttpTierBackend,
    LocalRulesBackend, TierBackend,
};
pub use cache::{
    CacheBackend, CacheError, CacheKey, CacheOutcome, Computed, MemoryBackend, ResponseCache,
};
pub use config::{
    CacheConfig, ConfigError, EndpointConfig, RetryConfig, RouterConfig, RuntimeConfig,
    TierConfig, TierConfigs,
};
pub use events::{ClassificationEvent, EventSink, MemorySink, TracingSink};
pub use inference::{InferenceClient, InferenceError, TierHealth};
pub use orchestrator::{
    BuildError, ClassificationOrchestrator, ClassificationOrchestratorBuilder, ClassifyError,
    HealthReport,
};
pub use resilience::{BreakerRegistry, CircuitBreakerConfig, CircuitState, Deadline, FallbackReason};
pub use router::{CascadePlan, PlanStep, StrategyRouter};
