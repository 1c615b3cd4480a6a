use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::{parse_daily_time, SchedulerConfig};
use orchestrator_core::models::{
    SchedulerStats, SchedulerStatus, TaskOutcome, TaskSchedule, TaskState, TaskSummary,
    ANALYSIS_TASK_ID, DETECTION_TASK_ID,
};
use orchestrator_core::traits::TaskAction;
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_observability::{MetricsCollector, StructuredLogger};

use crate::events::SchedulerEvent;
use crate::retry_service::RetryPolicy;
use crate::scheduled_task::{Disposition, ScheduledTask, TaskEntry};

const EVENT_CHANNEL_CAPACITY: usize = 256;

type TaskTable = Arc<RwLock<HashMap<String, TaskEntry>>>;

/// 任务调度器
///
/// 维护任务表，由单个调度循环按轮询间隔找出到期任务，并把每次执行放到独立的
/// tokio 任务中运行，慢任务不会阻塞调度循环或其他任务。同一任务ID在任意时刻最多
/// 只有一次执行处于 `Running` 状态。
pub struct TaskScheduler {
    config: SchedulerConfig,
    poll_interval: Duration,
    error_backoff: Duration,
    shutdown_timeout: Duration,
    tasks: TaskTable,
    stats: RwLock<SchedulerStats>,
    retry_policy: RetryPolicy,
    metrics: MetricsCollector,
    events: broadcast::Sender<SchedulerEvent>,
    generation: AtomicU64,
    running: AtomicBool,
    started_at: RwLock<Option<Instant>>,
    shutdown_tx: watch::Sender<bool>,
    dispatch_loop: Mutex<Option<JoinHandle<()>>>,
    executions: Mutex<Vec<JoinHandle<()>>>,
    /// 已注销但执行尚未结束的任务：ID -> 执行所属代次
    detached_runs: Mutex<HashMap<String, u64>>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            error_backoff: Duration::from_secs(config.loop_error_backoff_seconds),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_seconds),
            retry_policy: RetryPolicy::new(config.retry.clone()),
            config,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            stats: RwLock::new(SchedulerStats::default()),
            metrics: MetricsCollector::new(),
            events,
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            started_at: RwLock::new(None),
            shutdown_tx,
            dispatch_loop: Mutex::new(None),
            executions: Mutex::new(Vec::new()),
            detached_runs: Mutex::new(HashMap::new()),
        }
    }

    /// 覆盖调度循环的轮询间隔（默认取自配置，单位秒）
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ---- 任务注册 ----

    /// 注册检测任务，首次执行时间为 now + interval
    pub async fn schedule_detection(
        &self,
        action: Arc<dyn TaskAction>,
        interval_seconds: u64,
    ) -> SchedulerResult<DateTime<Utc>> {
        let task = ScheduledTask::interval(DETECTION_TASK_ID, "目标检测", action, interval_seconds)
            .with_max_retries(self.config.default_max_retries);
        self.register_task(task).await
    }

    /// 注册每日分析任务，`daily_time` 格式为 `HH:MM`（本地时间）
    pub async fn schedule_daily_analysis(
        &self,
        action: Arc<dyn TaskAction>,
        daily_time: &str,
    ) -> SchedulerResult<DateTime<Utc>> {
        let at = parse_daily_time(daily_time)?;
        let task = ScheduledTask::daily(ANALYSIS_TASK_ID, "每日分析", action, at)
            .with_max_retries(self.config.default_max_retries);
        self.register_task(task).await
    }

    pub async fn schedule_custom_task(
        &self,
        task_id: &str,
        name: &str,
        action: Arc<dyn TaskAction>,
        interval_seconds: u64,
        initial_delay_seconds: u64,
    ) -> SchedulerResult<DateTime<Utc>> {
        let task = ScheduledTask::interval(task_id, name, action, interval_seconds)
            .with_max_retries(self.config.default_max_retries)
            .with_initial_delay(Duration::from_secs(initial_delay_seconds));
        self.register_task(task).await
    }

    /// 注册任务并返回首次执行时间；相同ID的任务会被覆盖
    pub async fn register_task(&self, task: ScheduledTask) -> SchedulerResult<DateTime<Utc>> {
        task.validate()?;
        let next_run = task.first_run(Utc::now())?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = task.id.clone();

        StructuredLogger::log_task_registered(&task.id, &task.name, &task.schedule, next_run);

        let mut entry = TaskEntry::new(task, next_run, generation);
        let mut tasks = self.tasks.write().await;
        // 旧执行仍在运行时保持 Running，避免同一ID并发执行
        if let Some(mut previous) = tasks.remove(&task_id) {
            warn!("任务 {} 已存在，覆盖原有注册", task_id);
            if let Some(timer) = previous.pause_timer.take() {
                timer.abort();
            }
            if let Some(running) = previous.in_flight {
                entry.adopt_in_flight(running);
            }
        } else if let Some(running) = self.detached_runs.lock().await.remove(&task_id) {
            debug!("任务 {} 的上一次执行尚未结束，新注册等待其完成", task_id);
            entry.adopt_in_flight(running);
        }
        tasks.insert(task_id, entry);
        Ok(next_run)
    }

    /// 注销任务，正在执行的实例会跑完但结果被丢弃
    pub async fn remove_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let mut entry = tasks
            .remove(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        if let Some(timer) = entry.pause_timer.take() {
            timer.abort();
        }
        if let Some(running) = entry.in_flight {
            self.detached_runs
                .lock()
                .await
                .insert(task_id.to_string(), running);
        }
        drop(tasks);
        info!("任务 {} 已注销", task_id);
        Ok(())
    }

    // ---- 生命周期 ----

    pub async fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("调度器已在运行");
            return Err(SchedulerError::AlreadyRunning);
        }
        *self.started_at.write().await = Some(Instant::now());
        self.shutdown_tx.send_replace(false);

        let handle = tokio::spawn(Arc::clone(self).dispatch_loop(self.shutdown_tx.subscribe()));
        *self.dispatch_loop.lock().await = Some(handle);

        info!(
            "调度器已启动，轮询间隔 {}ms",
            self.poll_interval.as_millis()
        );
        Ok(())
    }

    /// 停止调度循环并等待执行中的任务完成
    ///
    /// 等待超过 `shutdown_timeout` 时返回 [`SchedulerError::ShutdownTimeout`]，
    /// 执行中的任务不会被中断；无论如何调度器都会被标记为停止。
    pub async fn stop(&self) -> SchedulerResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("调度器未运行，忽略停止请求");
            return Ok(());
        }
        info!("正在停止调度器...");
        self.shutdown_tx.send_replace(true);
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        let mut timed_out = false;
        if let Some(handle) = self.dispatch_loop.lock().await.take() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Err(e)) => error!("调度循环异常退出: {}", e),
                Err(_) => timed_out = true,
                Ok(Ok(())) => {}
            }
        }

        let executions = std::mem::take(&mut *self.executions.lock().await);
        let in_flight = executions.iter().filter(|h| !h.is_finished()).count();
        if in_flight > 0 {
            info!("等待 {} 个执行中的任务完成", in_flight);
        }
        for handle in executions {
            if timed_out {
                break;
            }
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                timed_out = true;
            }
        }

        if timed_out {
            let timeout_seconds = self.shutdown_timeout.as_secs();
            warn!("等待执行中任务超时（{}秒），调度器强制标记为停止", timeout_seconds);
            return Err(SchedulerError::ShutdownTimeout { timeout_seconds });
        }
        info!("调度器已停止");
        Ok(())
    }

    // ---- 动态控制 ----

    /// 暂停任务 `seconds` 秒，到期后自动恢复；再次暂停会取代前一次的恢复定时器
    pub async fn pause_task(&self, task_id: &str, seconds: u64) -> SchedulerResult<DateTime<Utc>> {
        if seconds == 0 {
            return Err(SchedulerError::InvalidInterval { seconds });
        }
        let duration = Duration::from_secs(seconds);

        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        let until = entry.pause(duration, Utc::now());
        let epoch = entry.pause_epoch;

        let table = Arc::clone(&self.tasks);
        let id = task_id.to_string();
        entry.pause_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut tasks = table.write().await;
            if let Some(entry) = tasks.get_mut(&id) {
                if entry.pause_epoch == epoch && entry.is_paused() {
                    entry.pause_timer.take();
                    entry.resume(Utc::now());
                    info!("任务 {} 暂停结束，已自动恢复", id);
                }
            }
        }));

        info!("任务 {} 已暂停 {} 秒，恢复时间 {}", task_id, seconds, until);
        Ok(until)
    }

    pub async fn resume_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        entry.resume(Utc::now());
        info!("任务 {} 已恢复，下次执行时间 {}", task_id, entry.next_run);
        Ok(())
    }

    pub async fn pause_detection(&self, seconds: u64) -> SchedulerResult<DateTime<Utc>> {
        self.pause_task(DETECTION_TASK_ID, seconds).await
    }

    pub async fn resume_detection(&self) -> SchedulerResult<()> {
        self.resume_task(DETECTION_TASK_ID).await
    }

    /// 修改间隔任务的执行间隔，下次执行时间重置为 now + interval
    pub async fn update_task_interval(
        &self,
        task_id: &str,
        interval_seconds: u64,
    ) -> SchedulerResult<DateTime<Utc>> {
        if interval_seconds < 1 {
            return Err(SchedulerError::InvalidInterval {
                seconds: interval_seconds,
            });
        }
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        if entry.task.schedule.is_daily() {
            return Err(SchedulerError::Configuration(format!(
                "任务 {task_id} 为每日定时任务，不支持修改间隔"
            )));
        }
        entry.task.schedule = TaskSchedule::Interval {
            seconds: interval_seconds,
        };
        entry.next_run = Utc::now() + ChronoDuration::seconds(interval_seconds as i64);
        info!(
            "任务 {} 执行间隔更新为 {} 秒，下次执行时间 {}",
            task_id, interval_seconds, entry.next_run
        );
        Ok(entry.next_run)
    }

    pub async fn update_detection_interval(
        &self,
        interval_seconds: u64,
    ) -> SchedulerResult<DateTime<Utc>> {
        self.update_task_interval(DETECTION_TASK_ID, interval_seconds)
            .await
    }

    /// 让任务在下一次轮询时立即执行
    pub async fn trigger_task(&self, task_id: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        if entry.state.is_running() {
            return Err(SchedulerError::TaskExecution(format!(
                "任务 {task_id} 正在执行中"
            )));
        }
        if !entry.enabled {
            return Err(SchedulerError::TaskExecution(format!(
                "任务 {task_id} 已暂停"
            )));
        }
        entry.next_run = Utc::now();
        info!("手动触发任务: {}", task_id);
        Ok(())
    }

    // ---- 查询 ----

    pub async fn get_status(&self) -> SchedulerStatus {
        let uptime_seconds = self.uptime_seconds().await;
        let tasks = self.tasks.read().await;

        let mut summaries: Vec<TaskSummary> = tasks.values().map(TaskEntry::summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        let paused = tasks
            .get(DETECTION_TASK_ID)
            .is_some_and(|entry| !entry.enabled);
        let active_tasks = tasks.values().filter(|e| e.state.is_running()).count();
        drop(tasks);

        let mut stats = self.stats.read().await.clone();
        stats.active_tasks = active_tasks;
        stats.uptime_seconds = uptime_seconds;

        SchedulerStatus {
            running: self.is_running(),
            paused,
            uptime_seconds,
            stats,
            tasks: summaries,
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Option<TaskSummary> {
        self.tasks.read().await.get(task_id).map(TaskEntry::summary)
    }

    async fn uptime_seconds(&self) -> u64 {
        match *self.started_at.read().await {
            Some(started) if self.is_running() => started.elapsed().as_secs(),
            _ => 0,
        }
    }

    // ---- 调度循环 ----

    async fn dispatch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            let wait = match self.dispatch_due_tasks().await {
                Ok(_) => self.poll_interval,
                Err(e) => {
                    StructuredLogger::log_system_error("scheduler", "dispatch_due_tasks", &e);
                    self.error_backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("调度循环已退出");
    }

    /// 执行一次调度：把所有到期任务标记为 Running 并各自启动执行，返回启动数量
    pub async fn dispatch_due_tasks(self: &Arc<Self>) -> SchedulerResult<usize> {
        let now = Utc::now();
        let due: Vec<(ScheduledTask, u64, DateTime<Utc>)> = {
            let mut tasks = self.tasks.write().await;
            tasks
                .values_mut()
                .filter(|entry| entry.is_due(now))
                .map(|entry| {
                    let due_at = entry.next_run;
                    entry.state = TaskState::Running;
                    entry.last_run = Some(now);
                    entry.in_flight = Some(entry.generation);
                    (entry.task.clone(), entry.generation, due_at)
                })
                .collect()
        };

        if due.is_empty() {
            return Ok(0);
        }

        let mut executions = self.executions.lock().await;
        executions.retain(|handle| !handle.is_finished());
        for (task, generation, due_at) in &due {
            StructuredLogger::log_task_dispatched(&task.id, &task.name, *due_at);
            let handle = tokio::spawn(Arc::clone(self).execute(task.clone(), *generation));
            executions.push(handle);
        }
        drop(executions);

        self.metrics.update_active_tasks(self.running_task_count().await);
        Ok(due.len())
    }

    async fn running_task_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|e| e.state.is_running())
            .count()
    }

    async fn execute(self: Arc<Self>, task: ScheduledTask, generation: u64) {
        let _ = self.events.send(SchedulerEvent::TaskStarted {
            task_id: task.id.clone(),
            name: task.name.clone(),
            started_at: Utc::now(),
        });

        let started = Instant::now();
        let action = Arc::clone(&task.action);
        // 在独立任务中执行以捕获 panic
        let outcome = match tokio::spawn(async move { action.execute().await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                error!("任务 {} 执行时发生 panic", task.id);
                TaskOutcome::failure(format!("任务执行发生panic: {e}"))
            }
            Err(e) => TaskOutcome::failure(format!("任务执行被取消: {e}")),
        };
        let elapsed = started.elapsed();

        self.complete(&task, generation, outcome, elapsed).await;
    }

    async fn complete(
        &self,
        task: &ScheduledTask,
        generation: u64,
        outcome: TaskOutcome,
        elapsed: Duration,
    ) {
        let now = Utc::now();
        let duration_ms = elapsed.as_millis() as u64;

        self.stats
            .write()
            .await
            .record_execution(outcome.success, elapsed.as_secs_f64() * 1000.0, now);
        self.metrics
            .record_task_execution(&task.id, outcome.success, elapsed.as_secs_f64());

        let applied = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&task.id) {
                Some(entry) if entry.in_flight == Some(generation) => {
                    if entry.generation != generation {
                        entry.release_stale();
                        None
                    } else {
                        entry.in_flight = None;
                        let result = entry.apply_outcome(&outcome, now, &self.retry_policy);
                        Some(match result {
                            Ok(disposition) => Ok((disposition, entry.next_run, entry.error_count)),
                            Err(e) => {
                                entry.state = TaskState::Failed;
                                entry.next_run = now
                                    + ChronoDuration::seconds(entry.task.schedule.period_seconds() as i64);
                                Err(e)
                            }
                        })
                    }
                }
                Some(_) => None,
                None => {
                    let mut detached = self.detached_runs.lock().await;
                    if detached.get(&task.id) == Some(&generation) {
                        detached.remove(&task.id);
                    }
                    None
                }
            }
        };
        self.metrics.update_active_tasks(self.running_task_count().await);

        let (disposition, next_run, error_count) = match applied {
            Some(Ok(applied)) => applied,
            Some(Err(e)) => {
                StructuredLogger::log_system_error("scheduler", "reschedule", &e);
                return;
            }
            None => {
                debug!("任务 {} 已被注销或重新注册，丢弃本次执行结果", task.id);
                return;
            }
        };

        let reason = outcome
            .message
            .clone()
            .unwrap_or_else(|| "任务执行失败".to_string());
        let event = match disposition {
            Disposition::Completed => {
                StructuredLogger::log_task_completed(
                    &task.id,
                    &task.name,
                    duration_ms,
                    outcome.message.as_deref(),
                    next_run,
                );
                SchedulerEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    duration_ms,
                    message: outcome.message,
                    next_run,
                }
            }
            Disposition::RetryScheduled { attempt } => {
                StructuredLogger::log_task_retry_scheduled(
                    &task.id,
                    attempt,
                    task.max_retries,
                    next_run,
                    &reason,
                );
                self.metrics.record_task_retry(&task.id);
                SchedulerEvent::TaskRetryScheduled {
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    attempt,
                    error: reason,
                    next_run,
                }
            }
            Disposition::Exhausted => {
                StructuredLogger::log_task_failed(&task.id, &task.name, error_count, &reason);
                self.metrics.record_task_failure(&task.id);
                SchedulerEvent::TaskFailed {
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    error_count,
                    error: reason,
                    next_run,
                }
            }
        };
        let _ = self.events.send(event);
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::traits::action_fn;

    fn noop() -> Arc<dyn TaskAction> {
        action_fn(|| async { TaskOutcome::success() })
    }

    #[tokio::test]
    async fn test_register_rejects_zero_interval() {
        let scheduler = TaskScheduler::default();
        let result = scheduler.schedule_custom_task("t", "t", noop(), 0, 0).await;
        assert!(matches!(result, Err(SchedulerError::InvalidInterval { seconds: 0 })));
    }

    #[tokio::test]
    async fn test_daily_analysis_rejects_bad_time() {
        let scheduler = TaskScheduler::default();
        let result = scheduler.schedule_daily_analysis(noop(), "25:99").await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimeFormat { .. })));
        assert!(scheduler.get_task(ANALYSIS_TASK_ID).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_marks_due_task_running_once() {
        let scheduler = Arc::new(TaskScheduler::default());
        let (release_tx, release_rx) = watch::channel(false);
        let action = action_fn(move || {
            let mut release = release_rx.clone();
            async move {
                let _ = release.wait_for(|released| *released).await;
                TaskOutcome::success()
            }
        });
        scheduler.schedule_custom_task("slow", "slow", action, 1, 0).await.unwrap();

        assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 0);
        assert_eq!(
            scheduler.get_task("slow").await.unwrap().state,
            TaskState::Running
        );

        release_tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let task = scheduler.get_task("slow").await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.run_count, 1);
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_ok() {
        let scheduler = TaskScheduler::default();
        assert!(scheduler.stop().await.is_ok());
        assert!(!scheduler.is_running());
    }
}
