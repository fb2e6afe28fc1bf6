use std::time::Duration;

use chrono::{DateTime, Utc};

/// Tuning for a task's failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    /// Consecutive tick failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a trial run.
    pub cooldown: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Tripped; due occurrences are skipped until the cooldown elapses.
    Open,
    /// Cooldown elapsed; the next occurrence runs as a trial.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        };
        write!(f, "{s}")
    }
}

/// Per-task failure state machine: Closed → Open after `failure_threshold`
/// consecutive failures → HalfOpen once the cooldown elapses → Closed on a
/// successful trial, back to Open on a failed one.
///
/// Skipped occurrences still advance the task's `next_run`, so a recovered
/// task resumes its original cadence instead of firing a catch-up burst.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a due occurrence at `now` may dispatch. Transitions
    /// Open → HalfOpen when the cooldown has elapsed.
    pub fn allow(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.signed_duration_since(at))
                    .and_then(|d| d.to_std().ok());
                if elapsed.is_some_and(|d| d >= self.policy.cooldown) {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    /// Record a failed tick. Returns `true` when this failure tripped the
    /// breaker open (for one-shot logging at the transition).
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.consecutive_failures += 1;
        match self.state {
            BreakerState::HalfOpen => {
                self.trip(now);
                true
            }
            BreakerState::Closed
                if self.consecutive_failures >= self.policy.failure_threshold =>
            {
                self.trip(now);
                true
            }
            _ => false,
        }
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
    }
}
