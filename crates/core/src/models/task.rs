use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 检测任务的保留ID
pub const DETECTION_TASK_ID: &str = "detection";
/// 每日分析任务的保留ID
pub const ANALYSIS_TASK_ID: &str = "daily_analysis";

/// 任务状态
///
/// 状态流转：
///
/// ```text
/// Pending → Running → Completed ─┐
///    ↑         ↓                 │
///    └──── (retry) ← Failed ←────┘ (下一个常规周期重新调度)
/// Pending/Completed/Failed → Cancelled (暂停) → Pending (恢复)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// 任务的调度方式
///
/// - `Interval`: 按固定间隔（秒）重复执行
/// - `Daily`: 每天在固定的本地时间执行一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskSchedule {
    Interval { seconds: u64 },
    Daily { at: NaiveTime },
}

impl TaskSchedule {
    /// 调度周期的名义长度（秒），每日任务为86400
    pub fn period_seconds(&self) -> u64 {
        match self {
            TaskSchedule::Interval { seconds } => *seconds,
            TaskSchedule::Daily { .. } => 86_400,
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, TaskSchedule::Daily { .. })
    }
}

impl std::fmt::Display for TaskSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskSchedule::Interval { seconds } => write!(f, "every {seconds}s"),
            TaskSchedule::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
        }
    }
}

/// 任务动作的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// 单个任务的状态摘要，用于状态查询
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub schedule: TaskSchedule,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub max_retries: u32,
    pub paused_until: Option<DateTime<Utc>>,
}

/// 调度器统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// 总执行次数
    pub total_executions: u64,
    /// 成功执行次数
    pub successful_executions: u64,
    /// 失败执行次数
    pub failed_executions: u64,
    /// 正在运行的任务数
    pub active_tasks: usize,
    /// 调度器运行时间（秒）
    pub uptime_seconds: u64,
    /// 最后执行时间
    pub last_execution_time: Option<DateTime<Utc>>,
    /// 平均执行耗时（毫秒）
    pub average_execution_ms: f64,
}

impl SchedulerStats {
    /// 记录一次执行完成，并更新滚动平均耗时
    pub fn record_execution(&mut self, success: bool, duration_ms: f64, finished_at: DateTime<Utc>) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
        let n = self.total_executions as f64;
        self.average_execution_ms += (duration_ms - self.average_execution_ms) / n;
        self.last_execution_time = Some(finished_at);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 1.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }
}

/// 调度器状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    /// 检测任务是否处于暂停状态
    pub paused: bool,
    pub uptime_seconds: u64,
    pub stats: SchedulerStats,
    pub tasks: Vec<TaskSummary>,
}

impl SchedulerStatus {
    pub fn task(&self, id: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_running_average() {
        let mut stats = SchedulerStats::default();
        let now = Utc::now();
        stats.record_execution(true, 100.0, now);
        stats.record_execution(false, 300.0, now);
        stats.record_execution(true, 200.0, now);

        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert!((stats.average_execution_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.last_execution_time, Some(now));
    }

    #[test]
    fn test_success_rate_without_executions() {
        let stats = SchedulerStats::default();
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[test]
    fn test_schedule_period() {
        assert_eq!(TaskSchedule::Interval { seconds: 300 }.period_seconds(), 300);
        let daily = TaskSchedule::Daily {
            at: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        };
        assert_eq!(daily.period_seconds(), 86_400);
        assert_eq!(daily.to_string(), "daily at 23:00");
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(TaskOutcome::success().success);
        let failed = TaskOutcome::failure("camera offline");
        assert!(!failed.success);
        assert_eq!(failed.message.as_deref(), Some("camera offline"));
    }
}
