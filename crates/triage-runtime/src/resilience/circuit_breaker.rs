//! Circuit breaker to prevent cascade failures.
//!
//! When a tier's backend fails repeatedly, its circuit opens and the router
//! stops planning that tier until a cool-down has passed. One breaker per
//! tier, grouped in a [`BreakerRegistry`] owned by the orchestrator.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use triage_core::ModelTier;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening the circuit
    pub failure_threshold: u32,

    /// Time an open circuit waits before admitting a probe
    #[serde(with = "crate::config::humantime_duration")]
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Tier unavailable, calls rejected without touching the network
    Open,

    /// One probe call admitted at a time
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Returned when a breaker refuses a call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("circuit open for tier {tier}")]
pub struct BreakerOpenError {
    pub tier: ModelTier,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_trial_in_flight: bool,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub tier: ModelTier,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trial_in_flight: bool,
}

/// Circuit breaker for a single tier.
///
/// All reads and writes go through one mutex, so transitions are
/// linearizable under concurrent requests. The Open → HalfOpen transition
/// happens lazily, the first time the breaker is consulted after the
/// cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    tier: ModelTier,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(tier: ModelTier, config: CircuitBreakerConfig) -> Self {
        Self {
            tier,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_trial_in_flight: false,
            }),
        }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    /// Current state, after applying any due cool-down transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call would be admitted right now.
    ///
    /// HalfOpen with a probe already in flight counts as unavailable.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !inner.half_open_trial_in_flight,
            CircuitState::Open => false,
        }
    }

    /// Ask to make a call.
    ///
    /// The returned permit must be settled with [`CallPermit::success`],
    /// [`CallPermit::failure`] or [`CallPermit::release`]. Dropping it
    /// unsettled behaves like `release`.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, BreakerOpenError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::HalfOpen if !inner.half_open_trial_in_flight => {
                inner.half_open_trial_in_flight = true;
                tracing::debug!(tier = %self.tier, "Admitting half-open probe");
                Ok(CallPermit::new(self, true))
            }
            _ => Err(BreakerOpenError { tier: self.tier }),
        }
    }

    /// Snapshot for health reporting and events.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        BreakerSnapshot {
            tier: self.tier,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trial_in_flight: inner.half_open_trial_in_flight,
        }
    }

    /// Force the circuit closed and clear counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_trial_in_flight = false;
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let due = inner
            .opened_at
            .map(|at| at.elapsed() >= self.config.cool_down)
            .unwrap_or(true);
        if due {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_trial_in_flight = false;
            tracing::info!(tier = %self.tier, "Circuit transitioning to half-open for recovery test");
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.half_open_trial_in_flight = false;
                tracing::info!(tier = %self.tier, "Circuit closed after successful recovery");
            }
            // A call admitted before the circuit opened finished late.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        tier = %self.tier,
                        failures = inner.consecutive_failures,
                        "Circuit opened after repeated failures"
                    );
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_trial_in_flight = false;
                tracing::warn!(tier = %self.tier, "Circuit reopened after failed recovery attempt");
            }
            _ => {}
        }
    }

    fn on_release(&self, trial: bool) {
        if !trial {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_trial_in_flight = false;
        }
    }
}

/// Admission for one call through a breaker.
#[must_use = "a permit must be settled with success(), failure() or release()"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The call succeeded.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    /// The call failed transiently.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    /// The call finished without saying anything about backend health.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_release(self.trial);
        }
    }
}

/// One breaker per backend tier.
///
/// Created with the orchestrator and dropped with it; never a global.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: BTreeMap<ModelTier, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let breakers = ModelTier::CASCADE
            .into_iter()
            .map(|tier| (tier, Arc::new(CircuitBreaker::new(tier, config.clone()))))
            .collect();
        Self { breakers }
    }

    pub fn get(&self, tier: ModelTier) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(&tier)
    }

    /// Whether the tier can be planned. Tiers without a breaker always can.
    pub fn is_available(&self, tier: ModelTier) -> bool {
        self.breakers
            .get(&tier)
            .map(|b| b.is_available())
            .unwrap_or(true)
    }

    pub fn state(&self, tier: ModelTier) -> CircuitState {
        self.breakers
            .get(&tier)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breakers.values().map(|b| b.snapshot()).collect()
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        for breaker in self.breakers.values() {
            breaker.reset();
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
