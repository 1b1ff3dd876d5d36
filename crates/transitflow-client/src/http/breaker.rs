//! Circuit breaker guarding a single (method, endpoint) key
//!
//! State transitions:
//! - Closed -> Open: consecutive failures reach the threshold
//! - Open -> HalfOpen: after the recovery timeout, one trial call is allowed
//! - HalfOpen -> Closed: three consecutive trial successes
//! - HalfOpen -> Open: a failed trial
//!
//! The breaker never swallows errors: the original failure is always
//! re-raised to the caller after being counted.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{ClientError, Result};

/// Consecutive successes required to close a half-open circuit. A single
/// success is not enough: an intermittently healthy backend must prove
/// itself before traffic fully resumes.
const HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 3;

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    /// Consecutive-failure count that opens the circuit
    pub failure_threshold: u32,
    /// How long an open circuit waits before allowing a trial call
    pub recovery_timeout: Duration,
    /// Nominal failure-observation window. Stored for interface
    /// compatibility; failure counting is a plain consecutive counter and
    /// attributes no windowing behavior to this field.
    pub monitoring_period: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            monitoring_period: Duration::from_millis(300_000),
        }
    }
}

impl BreakerPolicy {
    /// Create a policy with a custom failure threshold
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            ..Default::default()
        }
    }

    /// Set the recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set the monitoring period
    pub fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }
}

/// Breaker state machine positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Endpoint assumed down, calls fail fast
    Open,
    /// Probing recovery with trial calls
    HalfOpen,
}

/// Introspection snapshot of one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
}

struct BreakerState {
    current: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Per-endpoint circuit breaker.
///
/// Cheap to clone; clones share the same underlying state. All counter
/// updates happen under one lock, so counts are exact under concurrent load.
#[derive(Clone)]
pub struct CircuitBreaker {
    endpoint: String,
    policy: BreakerPolicy,
    state: Arc<RwLock<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy,
            state: Arc::new(RwLock::new(BreakerState {
                current: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                last_failure: None,
            })),
        }
    }

    /// Execute an operation under breaker protection.
    ///
    /// When the circuit is open and the recovery timeout has not elapsed,
    /// the operation is never invoked and the call fails with
    /// [`ClientError::CircuitOpen`].
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.reject_call() {
            return Err(ClientError::CircuitOpen {
                endpoint: self.endpoint.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn reject_call(&self) -> bool {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Open => {
                let expired = state
                    .last_failure
                    .map(|at| at.elapsed() >= self.policy.recovery_timeout)
                    .unwrap_or(false);
                if expired {
                    info!(endpoint = %self.endpoint, "circuit breaker: open -> half-open (trial call)");
                    state.current = CircuitState::HalfOpen;
                    state.half_open_successes = 0;
                    false
                } else {
                    true
                }
            }
            CircuitState::HalfOpen | CircuitState::Closed => false,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.write();

        state.failure_count = 0;
        if state.current == CircuitState::HalfOpen {
            state.half_open_successes += 1;
            if state.half_open_successes >= HALF_OPEN_SUCCESSES_TO_CLOSE {
                info!(endpoint = %self.endpoint, "circuit breaker: half-open -> closed");
                state.current = CircuitState::Closed;
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.write();

        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        if state.current != CircuitState::Open && state.failure_count >= self.policy.failure_threshold
        {
            warn!(
                endpoint = %self.endpoint,
                failures = state.failure_count,
                "circuit breaker opened"
            );
            state.current = CircuitState::Open;
        }
    }

    /// Current state and failure count, for monitoring surfaces
    pub fn status(&self) -> BreakerStatus {
        let state = self.state.read();
        BreakerStatus {
            state: state.current,
            failure_count: state.failure_count,
        }
    }

    /// Current state machine position
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    /// The (method, endpoint) key this breaker guards
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
