use chrono::{DateTime, Local, NaiveTime, TimeZone, Timelike, Utc};
use cron::Schedule;
use std::str::FromStr;

use orchestrator_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 解析6字段（含秒）的CRON表达式
    fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule })
    }

    /// 每天在指定时间触发一次
    pub fn daily_at(time: NaiveTime) -> SchedulerResult<Self> {
        Self::new(&format!("0 {} {} * * *", time.minute(), time.hour()))
    }

    /// 按指定时区解释表达式，返回下一次执行的UTC时间
    ///
    /// 当天的时间点已经过去时返回次日的时间点。
    pub fn next_execution_in<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(from)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    /// 按本地时区计算下一次执行时间
    pub fn next_local_execution(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_execution_in(&from.with_timezone(&Local))
    }
}
