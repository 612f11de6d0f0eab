// Prometheus metrics for cache and circuit breaker activity

use crate::core::errors::TodoError;
use crate::core::resilience::{BreakerEvent, BreakerListener, BreakerStats, CircuitState};
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Process-wide metric registry
pub struct Metrics {
    registry: Registry,
    breaker_state: IntGaugeVec,
    breaker_events: IntCounterVec,
    cache_operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, TodoError> {
        let registry = Registry::new();

        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "todos_circuit_breaker_state",
                "Circuit breaker state per store operation (0 closed, 1 half-open, 2 open)",
            ),
            &["operation"],
        )
        .map_err(metric_error)?;
        let breaker_events = IntCounterVec::new(
            Opts::new(
                "todos_circuit_breaker_events_total",
                "Circuit breaker call outcomes and transitions",
            ),
            &["operation", "event"],
        )
        .map_err(metric_error)?;
        let cache_operations = IntCounterVec::new(
            Opts::new(
                "todos_cache_operations_total",
                "Cache-aside operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(breaker_state.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(breaker_events.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_operations.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            breaker_state,
            breaker_events,
            cache_operations,
        })
    }

    pub fn record_cache(&self, operation: &str, outcome: &str) {
        self.cache_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn cache_count(&self, operation: &str, outcome: &str) -> u64 {
        self.cache_operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn breaker_state(&self, operation: &str) -> i64 {
        self.breaker_state.with_label_values(&[operation]).get()
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, TodoError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| TodoError::Internal(e.to_string()))
    }
}

fn state_value(state: CircuitState) -> i64 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::HalfOpen => 1,
        CircuitState::Open => 2,
    }
}

impl BreakerListener for Metrics {
    fn on_event(&self, operation: &str, event: &BreakerEvent, _stats: &BreakerStats) {
        self.breaker_events
            .with_label_values(&[operation, event.as_str()])
            .inc();

        let state = match event {
            BreakerEvent::Opened => Some(CircuitState::Open),
            BreakerEvent::HalfOpened => Some(CircuitState::HalfOpen),
            BreakerEvent::Closed => Some(CircuitState::Closed),
            _ => None,
        };
        if let Some(state) = state {
            self.breaker_state
                .with_label_values(&[operation])
                .set(state_value(state));
        }
    }

    fn on_attach(&self, operation: &str, state: CircuitState) {
        self.breaker_state
            .with_label_values(&[operation])
            .set(state_value(state));
    }
}

fn metric_error(e: prometheus::Error) -> TodoError {
    TodoError::Internal(format!("metrics error: {}", e))
}
