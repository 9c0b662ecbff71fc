//! Per-operation circuit breaker
//!
//! Closed breakers count outcomes within a rolling interval and trip open on
//! a run of consecutive failures or on a failure ratio once at least
//! [`MIN_REQUESTS_FOR_RATIO`] requests were seen. Open breakers reject calls
//! until `timeout` has passed, then let up to `max_requests` probes through
//! in half-open state. A half-open failure re-opens; `max_requests`
//! consecutive successes close.
//!
//! Every state change starts a new generation. Outcomes reported for a
//! permit from an older generation are ignored.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::Operation;
use crate::clock::{self, Clock};

pub const MIN_REQUESTS_FOR_RATIO: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half-open",
            BreakerState::Open => "open",
        }
    }

    /// Gauge encoding: 0 closed, 1 half-open, 2 open
    pub fn gauge_value(&self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BreakerSettings {
    /// Open-state duration; also the per-call timeout
    pub timeout: Duration,
    pub failure_ratio: f64,
    /// Probes allowed while half-open
    pub max_requests: u32,
    pub consecutive_failures: u32,
    /// Closed-state counting interval
    pub interval: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            failure_ratio: 0.5,
            max_requests: 5,
            consecutive_failures: 5,
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Ticket returned by [`CircuitBreaker::before_request`]
#[derive(Debug)]
#[must_use]
pub struct Permit {
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<DateTime<Utc>>,
    settings: BreakerSettings,
    last_adjusted: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    operation: Operation,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

fn should_trip(counts: &Counts, settings: &BreakerSettings) -> bool {
    if counts.consecutive_failures >= settings.consecutive_failures {
        return true;
    }
    counts.requests >= MIN_REQUESTS_FOR_RATIO
        && f64::from(counts.total_failures) / f64::from(counts.requests) >= settings.failure_ratio
}

impl CircuitBreaker {
    pub fn new(operation: Operation, settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let expiry = (!settings.interval.is_zero()).then(|| clock::add(now, settings.interval));
        Self {
            operation,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
                settings,
                last_adjusted: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> BreakerState {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        inner.counts
    }

    pub fn settings(&self) -> BreakerSettings {
        self.lock().settings.clone()
    }

    pub fn last_adjusted(&self) -> Option<DateTime<Utc>> {
        self.lock().last_adjusted
    }

    /// Replace thresholds without touching the current state or counts
    pub fn apply_settings(&self, settings: BreakerSettings, now: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.settings = settings;
        inner.last_adjusted = Some(now);
    }

    /// Admit a call, or report the state that rejected it
    pub fn before_request(&self) -> Result<Permit, BreakerState> {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        match inner.state {
            BreakerState::Open => return Err(BreakerState::Open),
            BreakerState::HalfOpen if inner.counts.requests >= inner.settings.max_requests => {
                return Err(BreakerState::HalfOpen);
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(Permit {
            generation: inner.generation,
        })
    }

    /// Report the outcome of an admitted call
    pub fn after_request(&self, permit: Permit, success: bool) {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        if inner.generation != permit.generation {
            return;
        }

        if success {
            inner.counts.on_success();
            if inner.state == BreakerState::HalfOpen
                && inner.counts.consecutive_successes >= inner.settings.max_requests
            {
                self.transition(&mut inner, BreakerState::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            match inner.state {
                BreakerState::Closed if should_trip(&inner.counts, &inner.settings) => {
                    self.transition(&mut inner, BreakerState::Open, now);
                }
                BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open, now),
                _ => {}
            }
        }
    }

    /// Roll the closed interval and move open breakers to half-open
    fn refresh(&self, inner: &mut Inner, now: DateTime<Utc>) {
        match inner.state {
            BreakerState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            BreakerState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.transition(inner, BreakerState::HalfOpen, now);
                }
            }
            BreakerState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: DateTime<Utc>) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);

        match to {
            BreakerState::Open => warn!(
                operation = %self.operation,
                from = %from,
                retry_after = ?inner.settings.timeout,
                "Circuit breaker opened"
            ),
            _ => info!(operation = %self.operation, from = %from, to = %to, "Circuit breaker state changed"),
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: DateTime<Utc>) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed => {
                (!inner.settings.interval.is_zero()).then(|| clock::add(now, inner.settings.interval))
            }
            BreakerState::Open => Some(clock::add(now, inner.settings.timeout)),
            BreakerState::HalfOpen => None,
        };
    }
}
