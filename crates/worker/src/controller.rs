use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use orchestrator_core::config::ControllerConfig;
use orchestrator_core::models::{Metric, TaskOutcome};
use orchestrator_core::traits::{action_fn, TaskAction};
use orchestrator_observability::{HealthMonitor, MetricsCollector};

use crate::collaborators::{
    AnalysisBackend, AnalysisReport, DetectionBackend, DetectionRequest, DetectionResult,
    HealthProbe,
};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::performance::{PerformanceReport, PerformanceTracker, WorkflowKind};

/// 检测历史中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub recorded_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub request: DetectionRequest,
    pub result: DetectionResult,
}

/// 子系统健康检查汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// 子系统名称 -> 状态描述
    pub subsystems: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// 工作流控制器
///
/// 调度器任务的实际业务：通过外部协作者执行检测与分析工作流，汇总各子系统
/// 探针的健康状况，并维护滚动的性能统计。检测与分析共用一把工作流锁，同一时刻
/// 只允许一个工作流在执行，并发调用立即返回 [`WorkflowError::Busy`]。
pub struct WorkflowController {
    config: ControllerConfig,
    detection: Arc<dyn DetectionBackend>,
    analysis: Arc<dyn AnalysisBackend>,
    probes: RwLock<BTreeMap<String, Arc<dyn HealthProbe>>>,
    workflow_lock: Mutex<()>,
    history_capacity: usize,
    history: RwLock<VecDeque<DetectionRecord>>,
    performance: RwLock<PerformanceTracker>,
    monitor: Option<Arc<HealthMonitor>>,
    metrics: MetricsCollector,
    started_at: Instant,
}

impl WorkflowController {
    pub fn new(
        config: ControllerConfig,
        detection: Arc<dyn DetectionBackend>,
        analysis: Arc<dyn AnalysisBackend>,
    ) -> Self {
        let performance =
            PerformanceTracker::new(config.performance_window, config.success_rate_warning);
        Self {
            history_capacity: config.history_capacity.max(1),
            config,
            detection,
            analysis,
            probes: RwLock::new(BTreeMap::new()),
            workflow_lock: Mutex::new(()),
            history: RwLock::new(VecDeque::new()),
            performance: RwLock::new(performance),
            monitor: None,
            metrics: MetricsCollector::new(),
            started_at: Instant::now(),
        }
    }

    /// 工作流指标同时写入监控器的指标存储
    pub fn with_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub async fn register_probe(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        let name = name.into();
        if self.probes.write().await.insert(name.clone(), probe).is_some() {
            warn!("子系统探针 {} 已存在，已覆盖", name);
        } else {
            info!("注册子系统探针: {}", name);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    // ---- 工作流 ----

    pub async fn execute_detection_workflow(
        &self,
        use_auxiliary_light: bool,
        persist_results: bool,
    ) -> WorkflowResult<DetectionResult> {
        let _guard = self.workflow_lock.try_lock().map_err(|_| {
            warn!("已有工作流正在执行，跳过本次检测请求");
            WorkflowError::Busy
        })?;

        let request = DetectionRequest {
            use_auxiliary_light,
            persist_results,
        };
        debug!(?request, "开始检测工作流");

        let started = Instant::now();
        let backend = Arc::clone(&self.detection);
        let joined = tokio::spawn(async move { backend.run_detection(&request).await }).await;
        let elapsed = started.elapsed();

        let outcome = match joined {
            Ok(Ok(result)) if result.success => Ok(result),
            Ok(Ok(result)) => Err(WorkflowError::DetectionFailed(
                result
                    .error
                    .unwrap_or_else(|| "检测器未返回错误信息".to_string()),
            )),
            Ok(Err(e)) => Err(WorkflowError::from_collaborator(e)),
            Err(e) => Err(WorkflowError::Panicked(e.to_string())),
        };

        self.record_execution(WorkflowKind::Detection, outcome.is_ok(), elapsed)
            .await;

        match &outcome {
            Ok(result) => {
                info!(
                    detection_count = result.detection_count,
                    confidence = result.confidence,
                    duration_ms = elapsed.as_millis() as u64,
                    "检测工作流完成"
                );
                self.push_history(DetectionRecord {
                    recorded_at: Utc::now(),
                    duration_ms: elapsed.as_millis() as u64,
                    request,
                    result: result.clone(),
                })
                .await;
                if let Some(monitor) = &self.monitor {
                    monitor
                        .record_metric(Metric::gauge(
                            "workflow.detection.objects",
                            result.detection_count as f64,
                            "count",
                        ))
                        .await;
                    monitor
                        .record_metric(Metric::gauge(
                            "workflow.detection.confidence",
                            result.confidence,
                            "ratio",
                        ))
                        .await;
                }
            }
            Err(e) => warn!("检测工作流失败: {}", e),
        }
        outcome
    }

    /// 分析指定日期的数据；无数据时返回 `Ok(None)`
    pub async fn execute_analysis_workflow(
        &self,
        date: NaiveDate,
        generate_report: bool,
    ) -> WorkflowResult<Option<AnalysisReport>> {
        let _guard = self.workflow_lock.try_lock().map_err(|_| {
            warn!("已有工作流正在执行，跳过本次分析请求");
            WorkflowError::Busy
        })?;
        info!("开始分析 {} 的数据", date);

        let started = Instant::now();
        let backend = Arc::clone(&self.analysis);
        let joined =
            tokio::spawn(async move { backend.analyze(date, generate_report).await }).await;
        let elapsed = started.elapsed();

        let outcome = match joined {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(WorkflowError::from_collaborator(e)),
            Err(e) => Err(WorkflowError::Panicked(e.to_string())),
        };
        self.record_execution(WorkflowKind::Analysis, outcome.is_ok(), elapsed)
            .await;

        match &outcome {
            Ok(Some(report)) => info!(
                "{} 分析完成，{} 项指标，耗时 {}ms",
                date,
                report.metrics.len(),
                elapsed.as_millis()
            ),
            Ok(None) => info!("{} 没有可分析的数据", date),
            Err(e) => warn!("{} 分析失败: {}", date, e),
        }
        outcome
    }

    async fn record_execution(&self, kind: WorkflowKind, success: bool, elapsed: Duration) {
        self.performance.write().await.record(kind, success, elapsed);
        self.metrics
            .record_workflow(kind.as_str(), success, elapsed.as_secs_f64());

        if let Some(monitor) = &self.monitor {
            let prefix = format!("workflow.{}", kind.as_str());
            monitor
                .record_metric(Metric::gauge(
                    format!("{prefix}.duration_ms"),
                    elapsed.as_secs_f64() * 1000.0,
                    "ms",
                ))
                .await;
            let performance = self.performance.read().await;
            let stats = performance.stats_for(kind);
            monitor
                .record_metric(Metric::gauge(
                    format!("{prefix}.success_rate"),
                    stats.success_rate,
                    "ratio",
                ))
                .await;
            monitor
                .record_metric(Metric::counter(
                    "workflow.executions_total",
                    performance.total_executions() as f64,
                    "count",
                ))
                .await;
        }
    }

    async fn push_history(&self, record: DetectionRecord) {
        let mut history = self.history.write().await;
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    // ---- 调度器动作 ----

    /// 包装为调度器任务动作，失败原因作为任务错误消息
    pub fn detection_action(
        self: &Arc<Self>,
        use_auxiliary_light: bool,
        persist_results: bool,
    ) -> Arc<dyn TaskAction> {
        let controller = Arc::clone(self);
        action_fn(move || {
            let controller = Arc::clone(&controller);
            async move {
                match controller
                    .execute_detection_workflow(use_auxiliary_light, persist_results)
                    .await
                {
                    Ok(result) => TaskOutcome::success_with(format!(
                        "检测到 {} 个目标，置信度 {:.2}",
                        result.detection_count, result.confidence
                    )),
                    Err(e) => TaskOutcome::failure(e.to_string()),
                }
            }
        })
    }

    /// 每日分析动作，分析当天（或前一天）的数据
    pub fn analysis_action(
        self: &Arc<Self>,
        generate_report: bool,
        analyze_previous_day: bool,
    ) -> Arc<dyn TaskAction> {
        let controller = Arc::clone(self);
        action_fn(move || {
            let controller = Arc::clone(&controller);
            async move {
                let today = Local::now().date_naive();
                let date = if analyze_previous_day {
                    today.pred_opt().unwrap_or(today)
                } else {
                    today
                };
                match controller
                    .execute_analysis_workflow(date, generate_report)
                    .await
                {
                    Ok(Some(_)) => TaskOutcome::success_with(format!("{date} 分析完成")),
                    Ok(None) => TaskOutcome::success_with(format!("{date} 无数据")),
                    Err(e) => TaskOutcome::failure(e.to_string()),
                }
            }
        })
    }

    // ---- 查询 ----

    /// 依次询问每个子系统探针，探针在阻塞线程池中并发执行
    pub async fn perform_health_check(&self) -> HealthCheckReport {
        let probes: Vec<(String, Arc<dyn HealthProbe>)> = self
            .probes
            .read()
            .await
            .iter()
            .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
            .collect();

        let mut subsystems = BTreeMap::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if probes.is_empty() {
            warnings.push("未注册任何子系统探针".to_string());
        }

        let checks = probes.into_iter().map(|(name, probe)| async move {
            let report = tokio::task::spawn_blocking(move || probe.check_health()).await;
            (name, report)
        });
        for (name, report) in join_all(checks).await {
            match report {
                Ok(report) if report.healthy => {
                    subsystems.insert(name, "healthy".to_string());
                }
                Ok(report) => {
                    errors.push(format!("{name}: {}", report.message));
                    subsystems.insert(name, format!("unhealthy: {}", report.message));
                }
                Err(e) => {
                    errors.push(format!("{name}: 探针执行异常: {e}"));
                    subsystems.insert(name, "error".to_string());
                }
            }
        }

        let success_rate = self.performance.read().await.success_rate();
        if success_rate < self.config.success_rate_warning {
            warnings.push(format!("工作流成功率偏低: {:.1}%", success_rate * 100.0));
        }
        if let Some(monitor) = &self.monitor {
            let system = monitor.get_system_health().await;
            if system.overall.is_abnormal() {
                warnings.push(format!(
                    "系统健康状态为 {}，未解决告警 {} 条",
                    system.overall, system.open_alerts
                ));
            }
        }

        let report = HealthCheckReport {
            healthy: errors.is_empty(),
            checked_at: Utc::now(),
            uptime_seconds: self.uptime_seconds(),
            subsystems,
            errors,
            warnings,
        };
        if !report.healthy {
            warn!("子系统健康检查发现 {} 个问题", report.errors.len());
        }
        report
    }

    /// 最近 `limit` 条检测记录，按时间升序
    pub async fn get_detection_history(&self, limit: usize) -> Vec<DetectionRecord> {
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub async fn get_performance_report(&self) -> PerformanceReport {
        self.performance.read().await.report(self.uptime_seconds())
    }
}
