//! Component health registry and aggregation.
//!
//! The daemon registers a check per background component (e.g. the stale-scan
//! sweeper); `/api/system/health` evaluates them on every request together
//! with the database.
//!
//! The overall status is the worst component status:
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use std::sync::{PoisonError, RwLock};

use ecuscan_core::pipeline::HealthStatus;
use serde::Serialize;

/// Health of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g. "store", "sweeper").
    pub name: String,
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Worst status plus the per-component breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        Self {
            status: aggregate_status(&components),
            components,
        }
    }
}

/// Returns the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", component.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

/// Evaluated on every health request; must not block.
pub type HealthCheck = Box<dyn Fn() -> HealthStatus + Send + Sync>;

/// Named health checks registered by the process hosting the API.
#[derive(Default)]
pub struct ComponentRegistry {
    checks: RwLock<Vec<(String, HealthCheck)>>,
}

impl ComponentRegistry {
    /// Register `check` under `name`, replacing an earlier check of the same name.
    pub fn register(&self, name: impl Into<String>, check: HealthCheck) {
        let name = name.into();
        let mut checks = self.checks.write().unwrap_or_else(PoisonError::into_inner);
        match checks.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = check,
            None => checks.push((name, check)),
        }
    }

    /// Run every check in registration order.
    pub fn snapshot(&self) -> Vec<ComponentHealth> {
        let checks = self.checks.read().unwrap_or_else(PoisonError::into_inner);
        checks
            .iter()
            .map(|(name, check)| ComponentHealth::new(name.clone(), check()))
            .collect()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let checks = self.checks.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_list()
            .entries(checks.iter().map(|(name, _)| name))
            .finish()
    }
}
