use chrono::{DateTime, Utc};
use serde::Serialize;

/// 调度器对外广播的任务事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    TaskStarted {
        task_id: String,
        name: String,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        name: String,
        duration_ms: u64,
        message: Option<String>,
        next_run: DateTime<Utc>,
    },
    TaskRetryScheduled {
        task_id: String,
        name: String,
        attempt: u32,
        error: String,
        next_run: DateTime<Utc>,
    },
    /// 重试次数耗尽
    TaskFailed {
        task_id: String,
        name: String,
        error_count: u64,
        error: String,
        next_run: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    pub fn task_id(&self) -> &str {
        match self {
            SchedulerEvent::TaskStarted { task_id, .. }
            | SchedulerEvent::TaskCompleted { task_id, .. }
            | SchedulerEvent::TaskRetryScheduled { task_id, .. }
            | SchedulerEvent::TaskFailed { task_id, .. } => task_id,
        }
    }
}
