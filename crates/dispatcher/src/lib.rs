//! 任务调度
//!
//! 维护任务表并由单个调度循环派发到期任务，每次执行运行在独立的 tokio 任务中。
//! 支持失败重试、暂停/恢复与运行中修改执行间隔。

pub mod cron_utils;
pub mod events;
pub mod retry_service;
pub mod scheduled_task;
pub mod scheduler;

pub use cron_utils::CronScheduler;
pub use events::SchedulerEvent;
pub use retry_service::RetryPolicy;
pub use scheduled_task::ScheduledTask;
pub use scheduler::TaskScheduler;
