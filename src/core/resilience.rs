// Circuit breaker guarding calls to the durable store

use crate::core::errors::{BreakerError, TodoError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Tuning for a single circuit breaker
///
/// Defaults:
/// - 5 second wall-clock budget per call
/// - opens at >= 50% errors over the rolling window
/// - 30 second cool-down before a Half-Open trial
/// - 10 second rolling window split into 10 buckets
/// - no sample floor: a single failed call in an empty window is a 100% error rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub timeout: Duration,
    pub error_threshold_percentage: u8,
    pub reset_timeout: Duration,
    pub rolling_count_timeout: Duration,
    pub rolling_count_buckets: u32,
    pub volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_secs(30),
            rolling_count_timeout: Duration::from_secs(10),
            rolling_count_buckets: 10,
            volume_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), TodoError> {
        if self.timeout.is_zero() {
            return Err(TodoError::Configuration(
                "circuit breaker timeout must be greater than 0".to_string(),
            ));
        }
        if self.error_threshold_percentage == 0 || self.error_threshold_percentage > 100 {
            return Err(TodoError::Configuration(format!(
                "circuit breaker error threshold must be between 1 and 100, got {}",
                self.error_threshold_percentage
            )));
        }
        if self.reset_timeout.is_zero() {
            return Err(TodoError::Configuration(
                "circuit breaker reset timeout must be greater than 0".to_string(),
            ));
        }
        if self.rolling_count_buckets == 0 {
            return Err(TodoError::Configuration(
                "circuit breaker rolling window needs at least one bucket".to_string(),
            ));
        }
        if self.bucket_width().is_zero() {
            return Err(TodoError::Configuration(format!(
                "rolling window of {:?} cannot be split into {} buckets",
                self.rolling_count_timeout, self.rolling_count_buckets
            )));
        }
        Ok(())
    }

    fn bucket_width(&self) -> Duration {
        self.rolling_count_timeout / self.rolling_count_buckets.max(1)
    }
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
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
            CircuitState::HalfOpen => "halfOpen",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, CircuitState::Closed)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counters since the last reset (a successful Half-Open trial)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejections: u64,
}

impl BreakerStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure => self.failures += 1,
            Outcome::Timeout => self.timeouts += 1,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub stats: BreakerStats,
}

/// Notification delivered to listeners on every call outcome and transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerEvent {
    Success,
    Failure { error: String },
    Timeout,
    Rejected,
    Opened,
    HalfOpened,
    Closed,
}

impl BreakerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerEvent::Success => "success",
            BreakerEvent::Failure { .. } => "failure",
            BreakerEvent::Timeout => "timeout",
            BreakerEvent::Rejected => "reject",
            BreakerEvent::Opened => "open",
            BreakerEvent::HalfOpened => "halfOpen",
            BreakerEvent::Closed => "close",
        }
    }
}

/// Observer for breaker activity
///
/// Called outside the breaker's lock with the stats as they were before the
/// event was applied. Implementations must not block.
pub trait BreakerListener: Send + Sync {
    fn on_event(&self, operation: &str, event: &BreakerEvent, stats: &BreakerStats);

    /// Called once when the listener is attached to a breaker
    fn on_attach(&self, _operation: &str, _state: CircuitState) {}
}

/// Listener that turns breaker activity into structured logs
pub struct TracingListener;

impl BreakerListener for TracingListener {
    fn on_event(&self, operation: &str, event: &BreakerEvent, stats: &BreakerStats) {
        match event {
            BreakerEvent::Success => debug!(operation, "Store request succeeded"),
            BreakerEvent::Failure { error } => {
                error!(operation, error = %error, "Store request failed")
            }
            BreakerEvent::Timeout => error!(operation, "Store request timed out"),
            BreakerEvent::Rejected => {
                warn!(operation, "Store request rejected - circuit breaker is open")
            }
            BreakerEvent::Opened => warn!(
                operation,
                successes = stats.successes,
                failures = stats.failures,
                timeouts = stats.timeouts,
                "Circuit breaker opened - requests will be rejected"
            ),
            BreakerEvent::HalfOpened => info!(
                operation,
                "Circuit breaker half-open - testing if service recovered"
            ),
            BreakerEvent::Closed => info!(operation, "Circuit breaker closed - service is healthy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

impl Outcome {
    fn is_error(self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bucket {
    successes: u64,
    failures: u64,
    timeouts: u64,
}

impl Bucket {
    fn total(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    fn errors(&self) -> u64 {
        self.failures + self.timeouts
    }
}

/// Fixed-duration outcome history split into equal time buckets
#[derive(Debug)]
struct RollingWindow {
    buckets: Vec<Bucket>,
    width: Duration,
    head: usize,
    head_started: Instant,
}

impl RollingWindow {
    fn new(config: &CircuitBreakerConfig, now: Instant) -> Self {
        let count = config.rolling_count_buckets.max(1) as usize;
        Self {
            buckets: vec![Bucket::default(); count],
            width: config.bucket_width().max(Duration::from_nanos(1)),
            head: 0,
            head_started: now,
        }
    }

    /// Advance the head bucket to `now`, clearing every bucket that fell out of the window
    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.head_started);
        let width_nanos = self.width.as_nanos();
        let steps = elapsed.as_nanos() / width_nanos;
        if steps == 0 {
            return;
        }

        let len = self.buckets.len();
        let to_clear = steps.min(len as u128) as usize;
        for _ in 0..to_clear {
            self.head = (self.head + 1) % len;
            self.buckets[self.head] = Bucket::default();
        }

        let remainder = (elapsed.as_nanos() % width_nanos) as u64;
        self.head_started = now - Duration::from_nanos(remainder);
    }

    fn record(&mut self, now: Instant, outcome: Outcome) {
        self.rotate(now);
        let bucket = &mut self.buckets[self.head];
        match outcome {
            Outcome::Success => bucket.successes += 1,
            Outcome::Failure => bucket.failures += 1,
            Outcome::Timeout => bucket.timeouts += 1,
        }
    }

    fn totals(&mut self, now: Instant) -> Bucket {
        self.rotate(now);
        self.buckets.iter().fold(Bucket::default(), |acc, b| Bucket {
            successes: acc.successes + b.successes,
            failures: acc.failures + b.failures,
            timeouts: acc.timeouts + b.timeouts,
        })
    }

    fn reset(&mut self, now: Instant) {
        self.buckets.iter_mut().for_each(|b| *b = Bucket::default());
        self.head = 0;
        self.head_started = now;
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: RollingWindow,
    stats: BreakerStats,
    opened_at: Option<Instant>,
    last_transition: Instant,
    trial_in_flight: bool,
}

impl Inner {
    fn transition(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.last_transition = now;
    }
}

type Notice = (BreakerEvent, BreakerStats);

/// Guards one operation type against a failing dependency
///
/// Closed: calls pass through and outcomes feed the rolling window.
/// Open: calls are rejected without invoking the operation until `reset_timeout` elapses.
/// Half-Open: exactly one trial call is let through; success closes and resets
/// the counters, failure or timeout re-opens and restarts the cool-down.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    listeners: Vec<Arc<dyn BreakerListener>>,
}

impl CircuitBreaker {
    /// Create a closed breaker that logs its activity through `tracing`
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        let window = RollingWindow::new(&config, now);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                stats: BreakerStats::default(),
                opened_at: None,
                last_transition: now,
                trial_in_flight: false,
            }),
            listeners: vec![Arc::new(TracingListener)],
        }
    }

    /// Register an additional listener and report the current state to it
    pub fn with_listener(mut self, listener: Arc<dyn BreakerListener>) -> Self {
        listener.on_attach(&self.name, self.state());
        self.listeners.push(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// True only while Closed
    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn stats(&self) -> BreakerStats {
        self.inner.lock().stats
    }

    pub fn last_transition(&self) -> Instant {
        self.inner.lock().last_transition
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            stats: inner.stats,
        }
    }

    /// Run `operation` under breaker protection
    ///
    /// While Closed the call runs and its outcome feeds the rolling window; an
    /// error that brings the window's error rate to the threshold opens the
    /// breaker. While Open the call is rejected until `reset_timeout` has
    /// elapsed, after which exactly one trial is admitted.
    ///
    /// # Arguments
    /// * `operation` - Produces the store call; it is not invoked on rejection
    ///
    /// # Returns
    /// * `Ok(T)` - The operation's value
    /// * `Err(BreakerError::Open)` - Rejected without calling `operation`
    /// * `Err(BreakerError::Timeout)` - The call exceeded `timeout` and was dropped
    /// * `Err(BreakerError::Inner)` - The operation's own error
    pub async fn invoke<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut permit = match self.acquire() {
            Some(permit) => permit,
            None => {
                return Err(BreakerError::Open {
                    operation: self.name.clone(),
                })
            }
        };

        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                permit.settle(Outcome::Success, None);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.settle(Outcome::Failure, Some(err.to_string()));
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                permit.settle(Outcome::Timeout, None);
                Err(BreakerError::Timeout {
                    operation: self.name.clone(),
                    after: self.config.timeout,
                })
            }
        }
    }

    fn acquire(&self) -> Option<Permit<'_>> {
        let now = Instant::now();
        let mut notices: Vec<Notice> = Vec::new();

        let trial = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Some(false),
                CircuitState::Open => {
                    let cooled_down = inner.opened_at.map_or(true, |opened| {
                        now.saturating_duration_since(opened) >= self.config.reset_timeout
                    });
                    if cooled_down {
                        notices.push((BreakerEvent::HalfOpened, inner.stats));
                        inner.transition(CircuitState::HalfOpen, now);
                        inner.trial_in_flight = true;
                        Some(true)
                    } else {
                        notices.push((BreakerEvent::Rejected, inner.stats));
                        inner.stats.rejections += 1;
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        notices.push((BreakerEvent::Rejected, inner.stats));
                        inner.stats.rejections += 1;
                        None
                    } else {
                        inner.trial_in_flight = true;
                        Some(true)
                    }
                }
            }
        };

        self.notify(notices);
        trial.map(|trial| Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn complete(&self, trial: bool, outcome: Outcome, error: Option<String>) {
        let now = Instant::now();
        let mut notices: Vec<Notice> = Vec::new();

        {
            let mut inner = self.inner.lock();
            let event = match outcome {
                Outcome::Success => BreakerEvent::Success,
                Outcome::Failure => BreakerEvent::Failure {
                    error: error.unwrap_or_default(),
                },
                Outcome::Timeout => BreakerEvent::Timeout,
            };
            notices.push((event, inner.stats));

            if trial {
                inner.trial_in_flight = false;
                if outcome.is_error() {
                    inner.stats.record(outcome);
                    inner.opened_at = Some(now);
                    notices.push((BreakerEvent::Opened, inner.stats));
                    inner.transition(CircuitState::Open, now);
                } else {
                    notices.push((BreakerEvent::Closed, inner.stats));
                    inner.stats = BreakerStats::default();
                    inner.window.reset(now);
                    inner.opened_at = None;
                    inner.transition(CircuitState::Closed, now);
                }
            } else {
                inner.stats.record(outcome);
                inner.window.record(now, outcome);

                if inner.state == CircuitState::Closed
                    && outcome.is_error()
                    && self.should_trip(&mut inner.window, now)
                {
                    inner.opened_at = Some(now);
                    notices.push((BreakerEvent::Opened, inner.stats));
                    inner.transition(CircuitState::Open, now);
                }
            }
        }

        self.notify(notices);
    }

    fn should_trip(&self, window: &mut RollingWindow, now: Instant) -> bool {
        let totals = window.totals(now);
        let total = totals.total();
        if total == 0 || total < u64::from(self.config.volume_threshold) {
            return false;
        }
        totals.errors() * 100 >= u64::from(self.config.error_threshold_percentage) * total
    }

    fn notify(&self, notices: Vec<Notice>) {
        for (event, stats) in notices {
            for listener in &self.listeners {
                listener.on_event(&self.name, &event, &stats);
            }
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Admission ticket for one call; a dropped, unsettled trial re-opens the breaker
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(&mut self, outcome: Outcome, error: Option<String>) {
        self.settled = true;
        self.breaker.complete(self.trial, outcome, error);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.complete(
                true,
                Outcome::Failure,
                Some("trial call cancelled before completion".to_string()),
            );
        }
    }
}
