use ensemble_core::{EnsembleError, EnsembleResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker state for one worker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected locally until the cooldown elapses.
    Open,
    /// A limited number of trial calls are admitted.
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failure count that trips the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting trial calls.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Maximum trial calls admitted while half-open.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    /// Trial successes required to close again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_half_open_max_calls() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    3
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            half_open_max_calls: default_half_open_max_calls(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl BreakerConfig {
    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
///
/// Carries the breaker window it was issued in. Outcomes reported with a
/// permit from an earlier window are ignored, so a slow call admitted
/// before the breaker re-opened cannot consume or free a slot of a later
/// half-open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPermit {
    window: u64,
}

struct BreakerInner {
    state: BreakerState,
    window: u64,
    failures: u32,
    successes: u32,
    trials: u32,
    opened_at: Option<Instant>,
}

/// Guards a single worker endpoint against cascading failures.
///
/// Only transport-class failures (network errors, timeouts, server errors)
/// are recorded against the breaker. All methods are synchronous and
/// never hold the lock across an await point.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                window: 0,
                failures: 0,
                successes: 0,
                trials: 0,
                opened_at: None,
            }),
        }
    }

    /// Name of the guarded endpoint.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured thresholds.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Admit or reject one call.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and
    /// admits up to `half_open_max_calls` trials.
    pub fn try_acquire(&self) -> EnsembleResult<BreakerPermit> {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            let cooled = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.cooldown());
            if !cooled {
                return Err(EnsembleError::CircuitOpen(self.name.clone()));
            }
            info!(breaker = %self.name, "Circuit half-open, admitting trial calls");
            inner.state = BreakerState::HalfOpen;
            inner.successes = 0;
            inner.trials = 0;
        }

        if inner.state == BreakerState::HalfOpen {
            if inner.trials >= self.config.half_open_max_calls {
                return Err(EnsembleError::CircuitOpen(self.name.clone()));
            }
            inner.trials += 1;
        }
        Ok(BreakerPermit {
            window: inner.window,
        })
    }

    /// Record a call that reached the worker and got a well-formed answer.
    pub fn record_success(&self, permit: BreakerPermit) {
        let mut inner = self.inner.lock();
        if permit.window != inner.window {
            return;
        }
        match inner.state {
            BreakerState::Closed => {
                inner.failures = inner.failures.saturating_sub(1);
            }
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    info!(breaker = %self.name, "Circuit closed");
                    inner.state = BreakerState::Closed;
                    inner.window += 1;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.trials = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record a transport-class failure.
    pub fn record_failure(&self, permit: BreakerPermit) {
        let mut inner = self.inner.lock();
        if permit.window != inner.window {
            return;
        }
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failures,
                        "Circuit opened"
                    );
                    Self::trip(&mut inner);
                }
            }
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
                Self::trip(&mut inner);
            }
            BreakerState::Open => {}
        }
    }

    /// Give back a half-open trial slot for a call that never completed.
    pub fn release_trial(&self, permit: BreakerPermit) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen && permit.window == inner.window {
            inner.trials = inner.trials.saturating_sub(1);
        }
    }

    /// Current state. An open breaker past its cooldown still reports
    /// `Open` until the next call is admitted.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether calls are currently being rejected.
    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    /// Failure counter while closed; each success decays it by one.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    fn trip(inner: &mut BreakerInner) {
        inner.state = BreakerState::Open;
        inner.window += 1;
        inner.opened_at = Some(Instant::now());
        inner.successes = 0;
        inner.trials = 0;
    }
}
