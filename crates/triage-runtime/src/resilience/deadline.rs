//! Request deadlines.
//!
//! A deadline is created by the orchestrator and passed down to every
//! cascade step and retry. Nothing starts unless the remaining budget can
//! cover it.

use std::time::Duration;
use tokio::time::Instant;

/// Time budget for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + budget,
        }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Whether `cost` still fits in the remaining budget.
    pub fn can_afford(&self, cost: Duration) -> bool {
        self.remaining() >= cost
    }

    /// `timeout`, shortened so it never runs past the deadline.
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }

    /// Time since the deadline was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The earlier of this deadline and one `budget` from now.
    pub fn tightened(&self, budget: Duration) -> Self {
        let candidate = Instant::now() + budget;
        Self {
            started: self.started,
            at: self.at.min(candidate),
        }
    }
}
