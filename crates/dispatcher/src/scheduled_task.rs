use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use orchestrator_core::models::{TaskOutcome, TaskSchedule, TaskState, TaskSummary};
use orchestrator_core::traits::TaskAction;
use orchestrator_core::{SchedulerError, SchedulerResult};

use crate::cron_utils::CronScheduler;
use crate::retry_service::RetryPolicy;

/// 待注册的任务定义
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub schedule: TaskSchedule,
    pub max_retries: u32,
    pub initial_delay: Option<Duration>,
    pub(crate) action: Arc<dyn TaskAction>,
}

impl ScheduledTask {
    /// 固定间隔任务，默认首次执行时间为 now + interval
    pub fn interval(
        id: impl Into<String>,
        name: impl Into<String>,
        action: Arc<dyn TaskAction>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schedule: TaskSchedule::Interval {
                seconds: interval_seconds,
            },
            max_retries: 0,
            initial_delay: None,
            action,
        }
    }

    /// 每天本地时间 `at` 执行一次
    pub fn daily(
        id: impl Into<String>,
        name: impl Into<String>,
        action: Arc<dyn TaskAction>,
        at: NaiveTime,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schedule: TaskSchedule::Daily { at },
            max_retries: 0,
            initial_delay: None,
            action,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub(crate) fn validate(&self) -> SchedulerResult<()> {
        if self.id.trim().is_empty() {
            return Err(SchedulerError::Configuration("任务ID不能为空".to_string()));
        }
        if let TaskSchedule::Interval { seconds } = self.schedule {
            if seconds < 1 {
                return Err(SchedulerError::InvalidInterval { seconds });
            }
        }
        Ok(())
    }

    pub(crate) fn first_run(&self, now: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        match (&self.schedule, self.initial_delay) {
            (_, Some(delay)) => Ok(now + to_chrono(delay)),
            (TaskSchedule::Interval { seconds }, None) => Ok(now + ChronoDuration::seconds(*seconds as i64)),
            (TaskSchedule::Daily { at }, None) => next_daily_run(*at, now),
        }
    }
}

pub(crate) fn next_daily_run(at: NaiveTime, now: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
    CronScheduler::daily_at(at)?
        .next_local_execution(now)
        .ok_or_else(|| SchedulerError::Internal(format!("无法计算每日 {at} 的下一次执行时间")))
}

pub(crate) fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

/// 执行结果应用到任务表后的去向
pub(crate) enum Disposition {
    Completed,
    RetryScheduled { attempt: u32 },
    Exhausted,
}

/// 任务表中的条目：定义 + 运行时状态
pub(crate) struct TaskEntry {
    pub task: ScheduledTask,
    pub state: TaskState,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    /// 自上次成功以来的连续失败次数
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub enabled: bool,
    pub paused_until: Option<DateTime<Utc>>,
    /// 注册代次，覆盖注册后旧执行的结果被丢弃
    pub generation: u64,
    /// 正在执行的那次调度所属的代次
    pub in_flight: Option<u64>,
    pub pause_epoch: u64,
    pub pause_timer: Option<JoinHandle<()>>,
}

impl TaskEntry {
    pub fn new(task: ScheduledTask, next_run: DateTime<Utc>, generation: u64) -> Self {
        Self {
            task,
            state: TaskState::Pending,
            next_run,
            last_run: None,
            run_count: 0,
            error_count: 0,
            consecutive_failures: 0,
            last_error: None,
            enabled: true,
            paused_until: None,
            generation,
            in_flight: None,
            pause_epoch: 0,
            pause_timer: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.state.is_running() && self.next_run <= now
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until.is_some()
    }

    /// 下一个常规周期：间隔任务取 max(last_run + interval, now) 以避免补偿性连续触发
    pub fn regular_next_run(&self, now: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        let next = match self.task.schedule {
            TaskSchedule::Interval { seconds } => {
                let base = self.last_run.unwrap_or(now);
                (base + ChronoDuration::seconds(seconds as i64)).max(now)
            }
            TaskSchedule::Daily { at } => next_daily_run(at, now)?,
        };
        Ok(self.respect_pause(next))
    }

    fn respect_pause(&self, next: DateTime<Utc>) -> DateTime<Utc> {
        match self.paused_until {
            Some(until) => next.max(until),
            None => next,
        }
    }

    pub fn apply_outcome(
        &mut self,
        outcome: &TaskOutcome,
        now: DateTime<Utc>,
        retry_policy: &RetryPolicy,
    ) -> SchedulerResult<Disposition> {
        let disposition = if outcome.success {
            self.run_count += 1;
            self.consecutive_failures = 0;
            self.state = TaskState::Completed;
            self.next_run = self.regular_next_run(now)?;
            Disposition::Completed
        } else {
            self.error_count += 1;
            self.consecutive_failures += 1;
            self.last_error = Some(
                outcome
                    .message
                    .clone()
                    .unwrap_or_else(|| "任务执行失败".to_string()),
            );

            if self.consecutive_failures <= self.task.max_retries {
                let attempt = self.consecutive_failures;
                let interval = Duration::from_secs(self.task.schedule.period_seconds());
                let delay = retry_policy.delay_for(attempt, interval);
                self.state = TaskState::Pending;
                self.next_run = self.respect_pause(now + to_chrono(delay));
                Disposition::RetryScheduled { attempt }
            } else {
                self.state = TaskState::Failed;
                self.consecutive_failures = 0;
                self.next_run = self.regular_next_run(now)?;
                Disposition::Exhausted
            }
        };

        if self.is_paused() {
            self.state = TaskState::Cancelled;
        }
        Ok(disposition)
    }

    pub fn pause(&mut self, duration: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        let delta = to_chrono(duration);
        let until = now + delta;
        self.enabled = false;
        self.paused_until = Some(until);
        self.next_run = self.next_run.max(now) + delta;
        if !self.state.is_running() {
            self.state = TaskState::Cancelled;
        }
        self.pause_epoch += 1;
        if let Some(timer) = self.pause_timer.take() {
            timer.abort();
        }
        until
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let Some(timer) = self.pause_timer.take() {
            timer.abort();
        }
        self.enabled = true;
        self.paused_until = None;
        if self.state == TaskState::Cancelled {
            self.state = TaskState::Pending;
        }
        // 提前恢复时不必等待整个暂停窗口
        let period = ChronoDuration::seconds(self.task.schedule.period_seconds() as i64);
        self.next_run = self.next_run.min(now + period);
    }

    /// 接管仍在运行的旧注册执行，保证同一ID不会并发执行
    pub fn adopt_in_flight(&mut self, generation: u64) {
        self.state = TaskState::Running;
        self.in_flight = Some(generation);
    }

    /// 旧注册的执行结束：只释放运行标记，新注册的调度保持不变
    pub fn release_stale(&mut self) {
        self.in_flight = None;
        self.state = if self.is_paused() {
            TaskState::Cancelled
        } else {
            TaskState::Pending
        };
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.task.id.clone(),
            name: self.task.name.clone(),
            state: self.state,
            schedule: self.task.schedule.clone(),
            enabled: self.enabled,
            next_run: self.next_run,
            last_run: self.last_run,
            run_count: self.run_count,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            max_retries: self.task.max_retries,
            paused_until: self.paused_until,
        }
    }
}
