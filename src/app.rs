use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::AppConfig;
use orchestrator_core::models::{AlertSeverity, ANALYSIS_TASK_ID, DETECTION_TASK_ID};
use orchestrator_core::SchedulerError;
use orchestrator_dispatcher::{ScheduledTask, SchedulerEvent, TaskScheduler};
use orchestrator_observability::checkers::builtin_checkers;
use orchestrator_observability::{HealthMonitor, LogNotificationChannel};
use orchestrator_worker::{
    AnalysisBackend, AnalysisReport, CommandAnalysis, CommandDetection, CommandProbe,
    DetectionBackend, DetectionRequest, DetectionResult, ProbeChecker, WorkflowController,
};

/// 任务重试耗尽时告警使用的条件名
pub const CONDITION_RETRIES_EXHAUSTED: &str = "retries_exhausted";

/// 任务对应的告警组件名
pub fn task_component(task_id: &str) -> String {
    format!("task:{task_id}")
}

/// 主应用程序：装配监控器、工作流控制器与调度器
pub struct Application {
    config: AppConfig,
    scheduler: Arc<TaskScheduler>,
    monitor: Arc<HealthMonitor>,
    controller: Arc<WorkflowController>,
    forwarder_stop: watch::Sender<bool>,
    event_forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Application {
    /// 使用配置中的外部命令作为协作者
    pub async fn new(config: AppConfig) -> Result<Self> {
        let detection: Arc<dyn DetectionBackend> = match &config.collaborators.detection {
            Some(command) => Arc::new(CommandDetection::new(command.clone())),
            None if config.detection.enabled => {
                anyhow::bail!("检测任务已启用，但未配置 collaborators.detection 命令")
            }
            None => Arc::new(DisabledCollaborator),
        };
        let analysis: Arc<dyn AnalysisBackend> = match &config.collaborators.analysis {
            Some(command) => Arc::new(CommandAnalysis::new(command.clone())),
            None if config.analysis.enabled => {
                anyhow::bail!("每日分析已启用，但未配置 collaborators.analysis 命令")
            }
            None => Arc::new(DisabledCollaborator),
        };
        Self::with_collaborators(config, detection, analysis).await
    }

    pub async fn with_collaborators(
        config: AppConfig,
        detection: Arc<dyn DetectionBackend>,
        analysis: Arc<dyn AnalysisBackend>,
    ) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        info!("初始化应用程序");

        let monitor = Arc::new(
            HealthMonitor::new(config.monitor.clone())
                .with_notification_channel(Arc::new(LogNotificationChannel)),
        );
        let controller = Arc::new(
            WorkflowController::new(config.controller.clone(), detection, analysis)
                .with_monitor(Arc::clone(&monitor)),
        );
        let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone()));

        for checker in builtin_checkers(&config.thresholds) {
            monitor.register_health_checker(checker).await;
        }
        for probe_config in &config.collaborators.probes {
            let probe = Arc::new(CommandProbe::new(probe_config.clone()));
            controller
                .register_probe(probe_config.name.clone(), probe.clone())
                .await;
            monitor
                .register_health_checker(Arc::new(ProbeChecker::new(
                    format!("subsystem:{}", probe_config.name),
                    probe,
                )))
                .await;
        }

        let (forwarder_stop, _) = watch::channel(false);
        Ok(Self {
            config,
            scheduler,
            monitor,
            controller,
            forwarder_stop,
            event_forwarder: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn controller(&self) -> &Arc<WorkflowController> {
        &self.controller
    }

    /// 注册配置中启用的任务
    pub async fn register_tasks(&self) -> Result<()> {
        let detection = &self.config.detection;
        if detection.enabled {
            let max_retries = detection
                .max_retries
                .unwrap_or(self.config.scheduler.default_max_retries);
            let action = self
                .controller
                .detection_action(detection.use_auxiliary_light, detection.persist_results);
            let task = ScheduledTask::interval(
                DETECTION_TASK_ID,
                "目标检测",
                action,
                detection.interval_seconds,
            )
            .with_max_retries(max_retries);
            self.scheduler.register_task(task).await?;
        }

        let analysis = &self.config.analysis;
        if analysis.enabled {
            let action = self
                .controller
                .analysis_action(analysis.generate_report, analysis.analyze_previous_day);
            self.scheduler
                .schedule_daily_analysis(action, &analysis.daily_time)
                .await?;
        }

        let status = self.scheduler.get_status().await;
        info!("已注册 {} 个任务", status.tasks.len());
        Ok(())
    }

    /// 注册任务并启动监控与调度
    pub async fn start(&self) -> Result<()> {
        self.register_tasks().await?;

        self.monitor
            .start_monitoring()
            .await
            .context("启动健康监控失败")?;

        self.forwarder_stop.send_replace(false);
        let handle = tokio::spawn(forward_scheduler_events(
            Arc::clone(&self.monitor),
            self.scheduler.subscribe(),
            self.forwarder_stop.subscribe(),
        ));
        *self.event_forwarder.lock().await = Some(handle);

        self.scheduler.start().await.context("启动调度器失败")?;
        let detection = self.scheduler.get_task(DETECTION_TASK_ID).await.is_some();
        let analysis = self.scheduler.get_task(ANALYSIS_TASK_ID).await.is_some();
        info!(detection, analysis, "应用程序已启动");
        Ok(())
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await?;
        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，开始停止组件");
        self.shutdown().await.map(|_| ())
    }

    /// 停止调度器与监控循环，并导出最终的健康报告
    pub async fn shutdown(&self) -> Result<PathBuf> {
        match self.scheduler.stop().await {
            Ok(()) => {}
            Err(SchedulerError::ShutdownTimeout { timeout_seconds }) => {
                warn!("调度器在 {} 秒内未能等待所有任务完成", timeout_seconds);
            }
            Err(e) => error!("停止调度器失败: {}", e),
        }

        self.forwarder_stop.send_replace(true);
        if let Some(handle) = self.event_forwarder.lock().await.take() {
            if let Err(e) = handle.await {
                error!("调度事件转发任务异常退出: {}", e);
            }
        }

        self.monitor.stop_monitoring().await?;

        let path = self
            .monitor
            .export_report(&self.config.monitor.report_dir)
            .await
            .context("导出最终健康报告失败")?;
        info!("最终健康报告: {}", path.display());
        Ok(path)
    }
}

/// 把调度器事件转换为监控告警：重试耗尽时开启告警，之后的一次成功执行将其解除
///
/// 收到停止信号后处理完已缓冲的事件再退出。
async fn forward_scheduler_events(
    monitor: Arc<HealthMonitor>,
    mut events: broadcast::Receiver<SchedulerEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => handle_scheduler_event(&monitor, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("调度事件处理滞后，丢弃 {} 条事件", skipped);
                }
                Err(RecvError::Closed) => return,
            },
            _ = stop.changed() => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        handle_scheduler_event(&monitor, event).await;
    }
    debug!("调度事件转发已停止");
}

async fn handle_scheduler_event(monitor: &HealthMonitor, event: SchedulerEvent) {
    match event {
        SchedulerEvent::TaskFailed {
            task_id,
            name,
            error_count,
            error,
            next_run,
        } => {
            let message = format!(
                "任务 {name} 重试耗尽（累计失败 {error_count} 次）: {error}，下次执行 {next_run}"
            );
            monitor
                .raise_alert(
                    &task_component(&task_id),
                    CONDITION_RETRIES_EXHAUSTED,
                    AlertSeverity::Error,
                    &message,
                )
                .await;
        }
        SchedulerEvent::TaskCompleted { task_id, .. } => {
            monitor.resolve_alerts(&task_component(&task_id)).await;
        }
        SchedulerEvent::TaskStarted { .. } | SchedulerEvent::TaskRetryScheduled { .. } => {}
    }
}

/// 未启用的工作流使用的占位协作者
struct DisabledCollaborator;

#[async_trait]
impl DetectionBackend for DisabledCollaborator {
    async fn run_detection(&self, _request: &DetectionRequest) -> anyhow::Result<DetectionResult> {
        anyhow::bail!("未配置检测命令")
    }
}

#[async_trait]
impl AnalysisBackend for DisabledCollaborator {
    async fn analyze(
        &self,
        _date: NaiveDate,
        _generate_report: bool,
    ) -> anyhow::Result<Option<AnalysisReport>> {
        anyhow::bail!("未配置分析命令")
    }
}
