use async_trait::async_trait;
use orchestrator_core::config::MonitorConfig;
use orchestrator_core::models::{ComponentHealth, HealthStatus, Metric};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_observability::{HealthMonitor, MetricsSource, CONDITION_OFFLINE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns whatever status the test sets.
struct ScriptedChecker {
    name: String,
    status: Mutex<HealthStatus>,
}

impl ScriptedChecker {
    fn new(name: &str, status: HealthStatus) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            status: Mutex::new(status),
        })
    }

    fn set(&self, status: HealthStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl HealthChecker for ScriptedChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let status = *self.status.lock().unwrap();
        Ok(ComponentHealth::new(self.name.clone(), status))
    }
}

struct FailingChecker;

#[async_trait]
impl HealthChecker for FailingChecker {
    fn name(&self) -> &str {
        "flaky_sensor"
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        Err(SchedulerError::CheckerFailed {
            name: "flaky_sensor".to_string(),
            message: "i2c read failed".to_string(),
        })
    }
}

struct SlowChecker;

#[async_trait]
impl HealthChecker for SlowChecker {
    fn name(&self) -> &str {
        "slow_probe"
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ComponentHealth::healthy("slow_probe"))
    }
}

struct CountingSource {
    calls: AtomicUsize,
}

impl MetricsSource for CountingSource {
    fn collect(&self) -> SchedulerResult<Vec<Metric>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Metric::gauge("system.cpu_percent", n as f64, "%")])
    }
}

fn monitor() -> HealthMonitor {
    HealthMonitor::new(MonitorConfig::default()).with_metrics_source(Arc::new(CountingSource {
        calls: AtomicUsize::new(0),
    }))
}

#[tokio::test]
async fn test_critical_alert_deduplicated_then_resolved() {
    let monitor = monitor();
    let checker = ScriptedChecker::new("cpu_temp", HealthStatus::Critical);
    monitor.register_health_checker(checker.clone()).await;

    monitor.run_health_checks().await.unwrap();
    let active = monitor.get_alerts(true).await;
    assert_eq!(active.len(), 1);
    let alert_id = active[0].id.clone();

    monitor.run_health_checks().await.unwrap();
    let active = monitor.get_alerts(true).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, alert_id);
    assert_eq!(active[0].occurrences, 2);

    checker.set(HealthStatus::Healthy);
    monitor.run_health_checks().await.unwrap();
    assert!(monitor.get_alerts(true).await.is_empty());

    let history = monitor.get_alerts(false).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].resolved);
    assert!(history[0].resolved_at.is_some());
}

#[tokio::test]
async fn test_offline_and_unknown_alert_handling() {
    let monitor = monitor();
    let checker = ScriptedChecker::new("camera", HealthStatus::Offline);
    monitor.register_health_checker(checker.clone()).await;

    monitor.run_health_checks().await.unwrap();
    let active = monitor.get_alerts(true).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].condition, CONDITION_OFFLINE);

    // Unknown leaves existing alerts untouched
    checker.set(HealthStatus::Unknown);
    monitor.run_health_checks().await.unwrap();
    assert_eq!(monitor.get_alerts(true).await.len(), 1);

    // back reachable but degraded: offline alert replaced by a health alert
    checker.set(HealthStatus::Warning);
    monitor.run_health_checks().await.unwrap();
    let active = monitor.get_alerts(true).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].condition, "health_check");
}

#[tokio::test]
async fn test_checker_error_recorded_as_unknown() {
    let monitor = monitor();
    monitor.register_health_checker(Arc::new(FailingChecker)).await;
    monitor
        .register_health_checker(ScriptedChecker::new("disk", HealthStatus::Healthy))
        .await;

    let results = monitor.run_health_checks().await.unwrap();
    assert_eq!(results.len(), 2);

    let sensor = monitor.get_component_health("flaky_sensor").await.unwrap();
    assert_eq!(sensor.status, HealthStatus::Unknown);
    assert!(sensor.error_message.unwrap().contains("i2c read failed"));

    let disk = monitor.get_component_health("disk").await.unwrap();
    assert_eq!(disk.status, HealthStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_checker_timeout_recorded_as_unknown() {
    let config = MonitorConfig {
        checker_timeout_seconds: 2,
        ..Default::default()
    };
    let monitor = HealthMonitor::new(config);
    monitor.register_health_checker(Arc::new(SlowChecker)).await;

    monitor.run_health_checks().await.unwrap();
    let health = monitor.get_component_health("slow_probe").await.unwrap();
    assert_eq!(health.status, HealthStatus::Unknown);
    assert!(health.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_system_health_uses_most_severe_status() {
    let monitor = monitor();
    assert_eq!(monitor.get_system_health().await.overall, HealthStatus::Unknown);

    monitor
        .register_health_checker(ScriptedChecker::new("disk", HealthStatus::Warning))
        .await;
    monitor
        .register_health_checker(ScriptedChecker::new("camera", HealthStatus::Error))
        .await;
    monitor
        .register_health_checker(ScriptedChecker::new("network", HealthStatus::Offline))
        .await;
    monitor.run_health_checks().await.unwrap();

    let health = monitor.get_system_health().await;
    assert_eq!(health.overall, HealthStatus::Error);
    assert_eq!(health.components.len(), 3);
    assert_eq!(health.open_alerts, 3);
}

#[tokio::test]
async fn test_register_overwrites_and_unregister_removes() {
    let monitor = monitor();
    monitor
        .register_health_checker(ScriptedChecker::new("disk", HealthStatus::Critical))
        .await;
    monitor
        .register_health_checker(ScriptedChecker::new("disk", HealthStatus::Healthy))
        .await;

    let results = monitor.run_health_checks().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, HealthStatus::Healthy);

    assert!(monitor.unregister_health_checker("disk").await);
    assert!(!monitor.unregister_health_checker("disk").await);
    assert!(monitor.get_component_health("disk").await.is_none());
}

#[tokio::test]
async fn test_acknowledge_alert() {
    let monitor = monitor();
    monitor
        .register_health_checker(ScriptedChecker::new("fan", HealthStatus::Warning))
        .await;
    monitor.run_health_checks().await.unwrap();

    let id = monitor.get_alerts(true).await[0].id.clone();
    let alert = monitor.acknowledge_alert(&id).await.unwrap();
    assert!(alert.acknowledged);
    assert!(!alert.resolved);

    assert!(matches!(
        monitor.acknowledge_alert("no-such-id").await,
        Err(SchedulerError::AlertNotFound { .. })
    ));
}

#[tokio::test]
async fn test_export_report_writes_timestamped_json() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor();
    monitor
        .register_health_checker(ScriptedChecker::new("cpu_temp", HealthStatus::Critical))
        .await;
    monitor.run_health_checks().await.unwrap();
    monitor.collect_system_metrics().await.unwrap();

    let path = monitor.export_report(dir.path().join("reports")).await.unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("health_report_"));
    assert!(file_name.ends_with(".json"));

    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(body["overall_status"], "critical");
    assert_eq!(body["alerts"]["active_count"], 1);
    assert!(body["current_metrics"]["system.cpu_percent"].is_object());
    assert!(body["hostname"].is_string());
}

#[tokio::test]
async fn test_raise_and_resolve_external_alerts() {
    let monitor = monitor();
    monitor
        .raise_alert(
            "task:detection",
            "retries_exhausted",
            orchestrator_core::models::AlertSeverity::Error,
            "camera timeout",
        )
        .await;
    assert_eq!(monitor.get_system_health().await.open_alerts, 1);
    assert_eq!(monitor.resolve_alerts("task:detection").await, 1);
    assert_eq!(monitor.resolve_alerts("task:detection").await, 0);
}

#[tokio::test]
async fn test_monitoring_loops_start_and_stop() {
    let config = MonitorConfig {
        health_check_interval_seconds: 1,
        metrics_interval_seconds: 1,
        ..Default::default()
    };
    let monitor = Arc::new(HealthMonitor::new(config).with_metrics_source(Arc::new(
        CountingSource {
            calls: AtomicUsize::new(0),
        },
    )));
    monitor
        .register_health_checker(ScriptedChecker::new("disk", HealthStatus::Healthy))
        .await;

    monitor.start_monitoring().await.unwrap();
    assert!(matches!(
        monitor.start_monitoring().await,
        Err(SchedulerError::AlreadyRunning)
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        monitor.get_component_health("disk").await.unwrap().status,
        HealthStatus::Healthy
    );
    assert_eq!(monitor.get_metric_history("system.cpu_percent", 1).await.len(), 1);

    monitor.stop_monitoring().await.unwrap();
    assert!(!monitor.is_running());
    monitor.stop_monitoring().await.unwrap();
}
