//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: dependency assumed down, attempts fail fast
//! - Half-Open: testing if the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure ratio >= threshold over the rolling window
//! Open → Half-Open: first admission attempt after the cooldown
//! Half-Open → Closed: trial attempt succeeds
//! Half-Open → Open: trial attempt fails (fresh cooldown)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, owned by its selector
//! - Every read-modify-write happens under one lock, so two callers can
//!   never both open or both close the breaker
//! - Every transition bumps a generation counter and every permit carries the
//!   generation it was issued in; outcomes and trial releases from an earlier
//!   generation are ignored

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::{CallError, CallResult};
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Most recent outcomes while closed; `true` is a failure.
    window: VecDeque<bool>,
    open_until: Option<Instant>,
    trials_in_flight: u32,
    /// Number of transitions so far.
    generation: u64,
}

/// Failure-ratio circuit breaker for one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(dependency: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            dependency: dependency.to_string(),
            config: config.clone(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                open_until: None,
                trials_in_flight: 0,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    /// Number of state transitions since construction.
    pub fn transitions(&self) -> u64 {
        self.inner.lock().expect("circuit breaker mutex poisoned").generation
    }

    /// Admit one attempt or fail fast with `CircuitOpen`.
    pub fn try_acquire(self: &Arc<Self>) -> CallResult<BreakerPermit> {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");

        let state = inner.state;
        let trial = match state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner.open_until.map_or(true, |until| Instant::now() >= until);
                if !cooled {
                    return Err(CallError::CircuitOpen(self.dependency.clone()));
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trials_in_flight = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight >= self.config.half_open_max_calls {
                    return Err(CallError::CircuitOpen(self.dependency.clone()));
                }
                inner.trials_in_flight += 1;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self.clone(),
            generation: inner.generation,
            trial,
            settled: false,
        })
    }

    fn on_success(&self, generation: u64, trial: bool) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.generation != generation {
            return;
        }
        let state = inner.state;
        match state {
            CircuitState::Closed => self.push_outcome(&mut inner, false),
            CircuitState::HalfOpen if trial => {
                inner.window.clear();
                inner.open_until = None;
                inner.trials_in_flight = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64, trial: bool) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.generation != generation {
            return;
        }
        let state = inner.state;
        match state {
            CircuitState::Closed => {
                self.push_outcome(&mut inner, true);
                let observed = inner.window.len();
                if observed >= self.config.minimum_calls.max(1) {
                    let failures = inner.window.iter().filter(|failed| **failed).count();
                    let ratio = failures as f64 / observed as f64;
                    if ratio >= self.config.failure_ratio_threshold {
                        tracing::warn!(
                            dependency = %self.dependency,
                            failures,
                            observed,
                            ratio,
                            "Failure ratio exceeded threshold"
                        );
                        self.open(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen if trial => self.open(&mut inner),
            _ => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn push_outcome(&self, inner: &mut BreakerInner, failed: bool) {
        if inner.window.len() >= self.config.window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.window.clear();
        inner.trials_in_flight = 0;
        inner.open_until = Some(Instant::now() + self.config.cooldown());
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        tracing::info!(
            dependency = %self.dependency,
            from = %from,
            to = %to,
            generation = inner.generation,
            "Circuit breaker state change"
        );
        metrics::record_circuit_transition(&self.dependency, to.as_str());
    }
}

/// Admission ticket for one attempt. Report the outcome with [`BreakerPermit::record`].
///
/// Dropping it unreported (cancellation) frees a half-open trial slot
/// without counting as success or failure.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl BreakerPermit {
    /// Record an attempt outcome.
    ///
    /// A non-transient remote error means the callee answered and counts as
    /// healthy. Errors raised by the bridge itself are not counted.
    pub fn record<T>(mut self, result: &CallResult<T>) {
        match result {
            Ok(_) | Err(CallError::RemoteError { transient: false, .. }) => {
                self.settled = true;
                self.breaker.on_success(self.generation, self.trial);
            }
            Err(e) if e.counts_as_failure() => {
                self.settled = true;
                self.breaker.on_failure(self.generation, self.trial);
            }
            Err(_) => {}
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial(self.generation);
        }
    }
}
