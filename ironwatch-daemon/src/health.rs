//! Aggregated health reporting.
//!
//! The overall daemon status is the worst status among the registered
//! modules.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use ironwatch_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all modules).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-module health reports.
    pub modules: Vec<ModuleHealth>,
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name ("ingestion", "extraction", "detection").
    pub name: String,
    pub status: HealthStatus,
}

/// Aggregate module health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// The reason lists every non-healthy module, worst ones only.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for module in modules {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", module.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", module.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: name.to_owned(),
            status,
        }
    }

    #[test]
    fn empty_is_healthy() {
        assert_eq!(aggregate_status(&[]), HealthStatus::Healthy);
    }

    #[test]
    fn degraded_reasons_are_joined() {
        let status = aggregate_status(&[
            module("ingestion", HealthStatus::Degraded("queue 95% full".to_owned())),
            module("extraction", HealthStatus::Healthy),
            module("detection", HealthStatus::Degraded("last cycle failed".to_owned())),
        ]);
        assert_eq!(
            status,
            HealthStatus::Degraded(
                "ingestion: queue 95% full; detection: last cycle failed".to_owned()
            )
        );
    }

    #[test]
    fn unhealthy_wins_over_degraded() {
        let status = aggregate_status(&[
            module("ingestion", HealthStatus::Degraded("queue 95% full".to_owned())),
            module("detection", HealthStatus::Unhealthy("stopped".to_owned())),
        ]);
        assert_eq!(status, HealthStatus::Unhealthy("detection: stopped".to_owned()));
    }
}
