use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 调度器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 调度循环轮询间隔
    pub poll_interval_seconds: u64,
    /// 调度循环异常后的退避时间
    pub loop_error_backoff_seconds: u64,
    /// stop() 等待执行中任务的上限
    pub shutdown_timeout_seconds: u64,
    pub default_max_retries: u32,
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1,
            loop_error_backoff_seconds: 5,
            shutdown_timeout_seconds: 30,
            default_max_retries: 3,
            retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.poll_interval_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "调度轮询间隔必须大于0".to_string(),
            ));
        }
        if self.shutdown_timeout_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "停止超时时间必须大于0".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// 失败任务的重试退避配置
///
/// 默认是固定 5 秒的短延迟；实际延迟同时受任务自身间隔限制。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_interval_seconds: u64,
    pub max_interval_seconds: u64,
    pub backoff_multiplier: f64,
    /// 0.0 - 1.0
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_seconds: 5,
            max_interval_seconds: 300,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.base_interval_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "重试基础间隔必须大于0".to_string(),
            ));
        }
        if self.max_interval_seconds < self.base_interval_seconds {
            return Err(SchedulerError::Configuration(format!(
                "重试最大间隔({})不能小于基础间隔({})",
                self.max_interval_seconds, self.base_interval_seconds
            )));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(SchedulerError::Configuration(
                "退避倍数不能小于1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(SchedulerError::Configuration(
                "抖动因子必须在0.0到1.0之间".to_string(),
            ));
        }
        Ok(())
    }
}

/// 检测任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub use_auxiliary_light: bool,
    pub persist_results: bool,
    pub max_retries: Option<u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            use_auxiliary_light: true,
            persist_results: true,
            max_retries: None,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.interval_seconds < 1 {
            return Err(SchedulerError::InvalidInterval {
                seconds: self.interval_seconds,
            });
        }
        Ok(())
    }
}

/// 每日分析任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub enabled: bool,
    /// 本地时间 HH:MM
    pub daily_time: String,
    pub generate_report: bool,
    /// 为 true 时分析前一天的数据
    pub analyze_previous_day: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_time: "23:00".to_string(),
            generate_report: true,
            analyze_previous_day: false,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        parse_daily_time(&self.daily_time).map(|_| ())
    }
}

/// 解析 `HH:MM` 格式的每日时间
pub fn parse_daily_time(value: &str) -> SchedulerResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        SchedulerError::InvalidTimeFormat {
            value: value.to_string(),
            message: e.to_string(),
        }
    })
}
