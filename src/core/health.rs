// Aggregate health verdict derived from circuit breaker state

use crate::core::resilience::{BreakerStats, CircuitBreaker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerHealth {
    pub healthy: bool,
    pub stats: BTreeMap<String, BreakerStats>,
}

/// Health report served to load balancers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerHealth,
}

/// Read-only view over every breaker guarding the store
pub struct HealthReporter {
    breakers: Vec<Arc<CircuitBreaker>>,
}

impl HealthReporter {
    pub fn new(breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        Self { breakers }
    }

    /// Build a health report from the current breaker snapshots
    ///
    /// The status is `healthy` only when every breaker is Closed; a breaker
    /// that is Open or running its Half-Open trial makes it `degraded`.
    /// Reading the report never changes breaker state.
    ///
    /// # Returns
    /// * `HealthReport` - Status, timestamp and per-operation stats keyed by
    ///   breaker name
    pub fn report(&self) -> HealthReport {
        let snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        let healthy = snapshots.iter().all(|s| s.state.is_closed());
        let stats = snapshots
            .into_iter()
            .map(|s| (s.name, s.stats))
            .collect::<BTreeMap<_, _>>();

        HealthReport {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            timestamp: Utc::now(),
            circuit_breaker: CircuitBreakerHealth { healthy, stats },
        }
    }
}
