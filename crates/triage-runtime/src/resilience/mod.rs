//! Resilience patterns for triage-runtime.
//!
//! This module provides:
//! - Per-tier circuit breakers to stop calling failing backends
//! - Request deadlines that bound retries and cascade steps
//! - Fallback reasons for degraded results

mod circuit_breaker;
mod deadline;
mod fallback;

pub use circuit_breaker::{
    BreakerOpenError, BreakerRegistry, BreakerSnapshot, CallPermit, CircuitBreaker,
    CircuitBreakerConfig, CircuitState,
};
pub use deadline::Deadline;
pub use fallback::FallbackReason;
