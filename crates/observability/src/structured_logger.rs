use chrono::{DateTime, Utc};
use orchestrator_core::models::{Alert, AlertSeverity, HealthStatus, TaskSchedule};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
    pub include_thread_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unsupported log format: {other}")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_id: false,
            include_thread_name: false,
        }
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_registered(
        task_id: &str,
        task_name: &str,
        schedule: &TaskSchedule,
        next_run: DateTime<Utc>,
    ) {
        info!(
            event = "task_registered",
            task.id = task_id,
            task.name = task_name,
            task.schedule = %schedule,
            task.next_run = %next_run,
            "Task registered"
        );
    }

    pub fn log_task_dispatched(task_id: &str, task_name: &str, due_at: DateTime<Utc>) {
        debug!(
            event = "task_dispatched",
            task.id = task_id,
            task.name = task_name,
            task.due_at = %due_at,
            "Task dispatched for execution"
        );
    }

    pub fn log_task_completed(
        task_id: &str,
        task_name: &str,
        duration_ms: u64,
        message: Option<&str>,
        next_run: DateTime<Utc>,
    ) {
        info!(
            event = "task_completed",
            task.id = task_id,
            task.name = task_name,
            task.duration_ms = duration_ms,
            task.message = message.unwrap_or(""),
            task.next_run = %next_run,
            "Task execution completed successfully"
        );
    }

    pub fn log_task_retry_scheduled(
        task_id: &str,
        attempt: u32,
        max_retries: u32,
        next_run: DateTime<Utc>,
        reason: &str,
    ) {
        warn!(
            event = "task_retry",
            task.id = task_id,
            task.retry_attempt = attempt,
            task.max_retries = max_retries,
            task.next_run = %next_run,
            task.retry_reason = reason,
            "Task failed, retry scheduled"
        );
    }

    pub fn log_task_failed(task_id: &str, task_name: &str, error_count: u64, reason: &str) {
        error!(
            event = "task_failed",
            task.id = task_id,
            task.name = task_name,
            task.error_count = error_count,
            task.error = reason,
            "Task failed after exhausting retries"
        );
    }

    pub fn log_health_check(
        component: &str,
        status: HealthStatus,
        latency_ms: u64,
        error_message: Option<&str>,
    ) {
        if status.is_abnormal() || status == HealthStatus::Offline {
            warn!(
                event = "health_check",
                component = component,
                health.status = status.as_str(),
                health.latency_ms = latency_ms,
                health.error = error_message.unwrap_or(""),
                "Component health degraded"
            );
        } else {
            debug!(
                event = "health_check",
                component = component,
                health.status = status.as_str(),
                health.latency_ms = latency_ms,
                "Component health checked"
            );
        }
    }

    pub fn log_alert_opened(alert: &Alert) {
        let severity = alert.severity.as_str();
        match alert.severity {
            AlertSeverity::Warning => warn!(
                event = "alert_opened",
                alert.id = %alert.id,
                alert.component = %alert.component,
                alert.condition = %alert.condition,
                alert.severity = severity,
                alert.message = %alert.message,
                "ALERT TRIGGERED"
            ),
            AlertSeverity::Error | AlertSeverity::Critical => error!(
                event = "alert_opened",
                alert.id = %alert.id,
                alert.component = %alert.component,
                alert.condition = %alert.condition,
                alert.severity = severity,
                alert.message = %alert.message,
                "ALERT TRIGGERED"
            ),
        }
    }

    pub fn log_alert_refreshed(alert: &Alert) {
        debug!(
            event = "alert_refreshed",
            alert.id = %alert.id,
            alert.component = %alert.component,
            alert.severity = alert.severity.as_str(),
            alert.occurrences = alert.occurrences,
            "Alert condition persists"
        );
    }

    pub fn log_alert_resolved(alert: &Alert) {
        info!(
            event = "alert_resolved",
            alert.id = %alert.id,
            alert.component = %alert.component,
            alert.condition = %alert.condition,
            "Alert resolved"
        );
    }

    pub fn log_alert_acknowledged(alert: &Alert) {
        info!(
            event = "alert_acknowledged",
            alert.id = %alert.id,
            alert.component = %alert.component,
            "Alert acknowledged"
        );
    }

    pub fn log_report_exported(path: &std::path::Path, overall: HealthStatus) {
        info!(
            event = "report_exported",
            report.path = %path.display(),
            report.overall = overall.as_str(),
            "Health report exported"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}
