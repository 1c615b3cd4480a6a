use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::watch;

use orchestrator_core::config::{ControllerConfig, MonitorConfig};
use orchestrator_core::models::HealthStatus;
use orchestrator_observability::HealthMonitor;
use orchestrator_worker::{
    AnalysisBackend, AnalysisReport, CollaboratorErrorKind, DetectionBackend, DetectionRequest,
    DetectionResult, HealthProbe, ProbeChecker, ProbeReport, WorkflowController, WorkflowError,
};

struct FakeDetection {
    calls: AtomicU32,
    gate: Option<watch::Receiver<bool>>,
    behaviour: Behaviour,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    IoError,
    Panic,
}

impl FakeDetection {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            calls: AtomicU32::new(0),
            gate: None,
            behaviour,
        }
    }

    fn gated(gate: watch::Receiver<bool>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(Behaviour::Succeed)
        }
    }
}

#[async_trait]
impl DetectionBackend for FakeDetection {
    async fn run_detection(&self, _request: &DetectionRequest) -> anyhow::Result<DetectionResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        match self.behaviour {
            Behaviour::Succeed => Ok(DetectionResult {
                success: true,
                detection_count: call,
                timestamp: "2024-05-01T10:00:00".to_string(),
                confidence: 0.75,
                error: None,
            }),
            Behaviour::IoError => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "camera device missing",
            )
            .into()),
            Behaviour::Panic => panic!("detector crashed"),
        }
    }
}

struct FakeAnalysis;

#[async_trait]
impl AnalysisBackend for FakeAnalysis {
    async fn analyze(
        &self,
        date: NaiveDate,
        _generate_report: bool,
    ) -> anyhow::Result<Option<AnalysisReport>> {
        if date.format("%d").to_string() == "01" {
            return Ok(None);
        }
        let mut metrics = BTreeMap::new();
        metrics.insert("detections".to_string(), 42.0);
        Ok(Some(AnalysisReport {
            date,
            metrics,
            report_path: None,
        }))
    }
}

struct StaticProbe(bool);

impl HealthProbe for StaticProbe {
    fn check_health(&self) -> ProbeReport {
        if self.0 {
            ProbeReport::healthy("ok")
        } else {
            ProbeReport::unhealthy("led driver not responding")
        }
    }
}

fn controller_with(detection: FakeDetection) -> Arc<WorkflowController> {
    Arc::new(WorkflowController::new(
        ControllerConfig::default(),
        Arc::new(detection),
        Arc::new(FakeAnalysis),
    ))
}

#[tokio::test]
async fn test_overlapping_detection_is_rejected() {
    let (open_tx, open_rx) = watch::channel(false);
    let controller = controller_with(FakeDetection::gated(open_rx));

    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.execute_detection_workflow(true, true).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = controller.execute_detection_workflow(true, true).await;
    assert!(matches!(second, Err(WorkflowError::Busy)));

    open_tx.send_replace(true);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.detection_count, 1);

    // 锁释放后可以再次执行
    assert!(controller.execute_detection_workflow(true, true).await.is_ok());
    assert_eq!(controller.get_detection_history(10).await.len(), 2);
}

#[tokio::test]
async fn test_analysis_rejected_while_detection_runs() {
    let (open_tx, open_rx) = watch::channel(false);
    let controller = controller_with(FakeDetection::gated(open_rx));

    let detection = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.execute_detection_workflow(false, false).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let analysis = controller.execute_analysis_workflow(day, false).await;
    assert!(matches!(analysis, Err(WorkflowError::Busy)));

    open_tx.send_replace(true);
    detection.await.unwrap().unwrap();
    assert!(controller
        .execute_analysis_workflow(day, false)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_collaborator_error_is_classified() {
    let controller = controller_with(FakeDetection::new(Behaviour::IoError));
    let err = controller
        .execute_detection_workflow(false, false)
        .await
        .unwrap_err();
    match err {
        WorkflowError::Collaborator { kind, message } => {
            assert_eq!(kind, CollaboratorErrorKind::Io);
            assert!(message.contains("camera device missing"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_collaborator_panic_is_contained() {
    let controller = controller_with(FakeDetection::new(Behaviour::Panic));
    let err = controller
        .execute_detection_workflow(false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Panicked(_)));

    let report = controller.get_performance_report().await;
    assert_eq!(report.failed_executions, 1);
    // panic 之后锁已释放
    let again = controller.execute_detection_workflow(false, false).await;
    assert!(matches!(again, Err(WorkflowError::Panicked(_))));
}

#[tokio::test]
async fn test_analysis_distinguishes_empty_day() {
    let controller = controller_with(FakeDetection::new(Behaviour::Succeed));

    let empty = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert!(controller
        .execute_analysis_workflow(empty, true)
        .await
        .unwrap()
        .is_none());

    let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let report = controller
        .execute_analysis_workflow(day, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.metrics["detections"], 42.0);

    let performance = controller.get_performance_report().await;
    assert_eq!(performance.analysis.executions, 2);
    assert_eq!(performance.analysis.successes, 2);
}

#[tokio::test]
async fn test_task_actions_report_outcomes() {
    let ok = controller_with(FakeDetection::new(Behaviour::Succeed));
    let outcome = ok.detection_action(true, false).execute().await;
    assert!(outcome.success);
    assert!(outcome.message.unwrap().contains("1"));

    let failing = controller_with(FakeDetection::new(Behaviour::IoError));
    let outcome = failing.detection_action(true, false).execute().await;
    assert!(!outcome.success);
    assert!(outcome.message.unwrap().contains("camera device missing"));

    let outcome = ok.analysis_action(false, true).execute().await;
    assert!(outcome.success);
}

#[tokio::test]
async fn test_workflow_metrics_recorded_in_monitor() {
    let monitor = Arc::new(HealthMonitor::new(MonitorConfig::default()));
    let controller = Arc::new(
        WorkflowController::new(
            ControllerConfig::default(),
            Arc::new(FakeDetection::new(Behaviour::Succeed)),
            Arc::new(FakeAnalysis),
        )
        .with_monitor(Arc::clone(&monitor)),
    );

    controller
        .execute_detection_workflow(true, true)
        .await
        .unwrap();

    let durations = monitor
        .get_metric_history("workflow.detection.duration_ms", 1)
        .await;
    assert_eq!(durations.len(), 1);
    let current = monitor.get_current_metrics().await;
    assert_eq!(current["workflow.detection.objects"].value, 1.0);
    assert_eq!(current["workflow.detection.success_rate"].value, 1.0);
}

#[tokio::test]
async fn test_probes_feed_controller_and_monitor() {
    let controller = controller_with(FakeDetection::new(Behaviour::Succeed));
    let led: Arc<dyn HealthProbe> = Arc::new(StaticProbe(false));
    controller.register_probe("hardware", Arc::new(StaticProbe(true))).await;
    controller.register_probe("led", Arc::clone(&led)).await;

    let report = controller.perform_health_check().await;
    assert!(!report.healthy);
    assert_eq!(report.subsystems.len(), 2);
    assert_eq!(report.subsystems["hardware"], "healthy");
    assert_eq!(report.errors.len(), 1);

    let monitor = HealthMonitor::new(MonitorConfig::default());
    monitor
        .register_health_checker(Arc::new(ProbeChecker::new("led", led)))
        .await;
    let results = monitor.run_health_checks().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, HealthStatus::Error);
    assert_eq!(monitor.get_alerts(true).await.len(), 1);
}
