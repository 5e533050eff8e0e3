//! Aggregated health reporting.
//!
//! The orchestrator polls each module's `health_check()` and produces a
//! unified [`DaemonHealth`] report. The overall daemon status is the worst
//! status among all enabled modules.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use watchtower_core::pipeline::HealthStatus;

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
    /// Module name (e.g. "log-pipeline").
    pub name: String,
    /// Whether the module is enabled.
    pub enabled: bool,
    /// Current health status of the module.
    pub status: HealthStatus,
}

/// Aggregate module health statuses into a single status.
///
/// Unhealthy reasons replace any collected Degraded reasons.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => degraded.push(format!("{}: {reason}", module.name)),
            HealthStatus::Unhealthy(reason) => unhealthy.push(format!("{}: {reason}", module.name)),
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

/// Log an aggregated health report at a level matching its status.
pub fn log_report(report: &DaemonHealth) {
    match &report.status {
        HealthStatus::Healthy => {
            tracing::debug!(uptime_secs = report.uptime_secs, "daemon healthy");
        }
        HealthStatus::Degraded(reason) => {
            tracing::warn!(uptime_secs = report.uptime_secs, reason = %reason, "daemon degraded");
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(uptime_secs = report.uptime_secs, reason = %reason, "daemon unhealthy");
        }
    }
}
