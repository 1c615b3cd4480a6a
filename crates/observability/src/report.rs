use chrono::{DateTime, Utc};
use orchestrator_core::models::{Alert, ComponentHealth, HealthStatus, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot written by `HealthMonitor::export_report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub hostname: String,
    pub monitor_uptime_seconds: u64,
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub current_metrics: BTreeMap<String, Metric>,
    pub alerts: AlertSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    pub active_count: usize,
    pub active_by_severity: BTreeMap<String, usize>,
    pub active: Vec<Alert>,
    /// most recent resolved alerts, newest last
    pub recently_resolved: Vec<Alert>,
}

impl AlertSummary {
    pub const RESOLVED_LIMIT: usize = 50;

    pub fn from_history(history: Vec<Alert>, active_by_severity: BTreeMap<String, usize>) -> Self {
        let total = history.len();
        let (active, resolved): (Vec<Alert>, Vec<Alert>) =
            history.into_iter().partition(Alert::is_active);
        let skip = resolved.len().saturating_sub(Self::RESOLVED_LIMIT);
        Self {
            total,
            active_count: active.len(),
            active_by_severity,
            active,
            recently_resolved: resolved.into_iter().skip(skip).collect(),
        }
    }
}

pub(crate) fn current_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub(crate) fn report_file_name(at: DateTime<Utc>) -> String {
    format!("health_report_{}.json", at.format("%Y%m%d_%H%M%S_%3f"))
}
