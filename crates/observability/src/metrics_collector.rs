use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use orchestrator_core::models::HealthStatus;

/// Thin wrapper over the `metrics` facade. Without an installed recorder every
/// call is a no-op, so it is safe to use in tests and when export is disabled.
#[derive(Clone)]
pub struct MetricsCollector {
    task_executions_total: Counter,
    task_execution_duration: Histogram,
    task_failures_total: Counter,
    task_retries_total: Counter,
    active_tasks: Gauge,
    open_alerts: Gauge,
    health_checks_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            task_executions_total: counter!("orchestrator_task_executions_total"),
            task_execution_duration: histogram!("orchestrator_task_execution_duration_seconds"),
            task_failures_total: counter!("orchestrator_task_failures_total"),
            task_retries_total: counter!("orchestrator_task_retries_total"),
            active_tasks: gauge!("orchestrator_active_tasks"),
            open_alerts: gauge!("orchestrator_open_alerts"),
            health_checks_total: counter!("orchestrator_health_checks_total"),
        }
    }

    pub fn record_task_execution(&self, task_id: &str, success: bool, duration_seconds: f64) {
        self.task_executions_total.increment(1);
        self.task_execution_duration.record(duration_seconds);
        let status = if success { "success" } else { "failure" };
        counter!(
            "orchestrator_task_results_total",
            "task_id" => task_id.to_string(),
            "status" => status
        )
        .increment(1);
    }

    pub fn record_task_retry(&self, task_id: &str) {
        self.task_retries_total.increment(1);
        counter!("orchestrator_task_retry_attempts_total", "task_id" => task_id.to_string())
            .increment(1);
    }

    /// Retries exhausted.
    pub fn record_task_failure(&self, task_id: &str) {
        self.task_failures_total.increment(1);
        counter!("orchestrator_task_exhausted_total", "task_id" => task_id.to_string())
            .increment(1);
    }

    pub fn update_active_tasks(&self, count: usize) {
        self.active_tasks.set(count as f64);
    }

    pub fn update_open_alerts(&self, count: usize) {
        self.open_alerts.set(count as f64);
    }

    pub fn record_health_check(&self, component: &str, status: HealthStatus, latency_ms: u64) {
        self.health_checks_total.increment(1);
        gauge!("orchestrator_component_health", "component" => component.to_string())
            .set(status.severity_rank() as f64);
        histogram!(
            "orchestrator_health_check_latency_seconds",
            "component" => component.to_string()
        )
        .record(latency_ms as f64 / 1000.0);
    }

    pub fn record_system_metric(&self, name: &str, value: f64) {
        gauge!("orchestrator_system_metric", "name" => name.to_string()).set(value);
    }

    pub fn record_workflow(&self, workflow: &'static str, success: bool, duration_seconds: f64) {
        let status = if success { "success" } else { "failure" };
        counter!("orchestrator_workflow_runs_total", "workflow" => workflow, "status" => status)
            .increment(1);
        histogram!("orchestrator_workflow_duration_seconds", "workflow" => workflow)
            .record(duration_seconds);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
