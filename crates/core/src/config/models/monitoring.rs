use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 健康监控配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub health_check_interval_seconds: u64,
    pub metrics_interval_seconds: u64,
    pub loop_error_backoff_seconds: u64,
    /// 单个检查器的执行上限，超时记为 Unknown
    pub checker_timeout_seconds: u64,
    pub metric_retention_hours: u64,
    pub max_samples_per_metric: usize,
    pub report_dir: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: 30,
            metrics_interval_seconds: 60,
            loop_error_backoff_seconds: 5,
            checker_timeout_seconds: 10,
            metric_retention_hours: 24,
            max_samples_per_metric: 10_000,
            report_dir: "reports".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.health_check_interval_seconds < 1 {
            return Err(SchedulerError::InvalidInterval {
                seconds: self.health_check_interval_seconds,
            });
        }
        if self.metrics_interval_seconds < 1 {
            return Err(SchedulerError::InvalidInterval {
                seconds: self.metrics_interval_seconds,
            });
        }
        if self.checker_timeout_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "检查器超时时间必须大于0".to_string(),
            ));
        }
        if self.metric_retention_hours == 0 || self.max_samples_per_metric == 0 {
            return Err(SchedulerError::Configuration(
                "指标保留时长和最大样本数必须大于0".to_string(),
            ));
        }
        if self.report_dir.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "报告目录不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

/// 内置检查器的告警阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub disk_path: String,
    /// 剩余空间百分比低于该值为 Warning
    pub disk_warning_free_percent: f64,
    /// 剩余空间百分比低于该值为 Critical
    pub disk_critical_free_percent: f64,
    pub temperature_check_enabled: bool,
    pub temperature_warning_celsius: f64,
    pub temperature_critical_celsius: f64,
    pub cpu_warning_percent: f64,
    pub cpu_critical_percent: f64,
    pub memory_warning_percent: f64,
    pub memory_critical_percent: f64,
    /// 需要保持存活的进程名
    pub watched_processes: Vec<String>,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            disk_path: ".".to_string(),
            disk_warning_free_percent: 15.0,
            disk_critical_free_percent: 5.0,
            temperature_check_enabled: true,
            temperature_warning_celsius: 70.0,
            temperature_critical_celsius: 85.0,
            cpu_warning_percent: 80.0,
            cpu_critical_percent: 95.0,
            memory_warning_percent: 85.0,
            memory_critical_percent: 95.0,
            watched_processes: Vec::new(),
        }
    }
}

impl ThresholdsConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.disk_path.trim().is_empty() {
            return Err(SchedulerError::Configuration(
                "磁盘检查路径不能为空".to_string(),
            ));
        }
        // 剩余空间越少越严重，因此 Warning 阈值应高于 Critical 阈值
        if self.disk_warning_free_percent <= self.disk_critical_free_percent {
            return Err(SchedulerError::Configuration(format!(
                "磁盘剩余空间告警阈值({}%)必须高于严重阈值({}%)",
                self.disk_warning_free_percent, self.disk_critical_free_percent
            )));
        }
        check_ascending(
            "温度",
            self.temperature_warning_celsius,
            self.temperature_critical_celsius,
        )?;
        check_ascending("CPU", self.cpu_warning_percent, self.cpu_critical_percent)?;
        check_ascending(
            "内存",
            self.memory_warning_percent,
            self.memory_critical_percent,
        )?;
        Ok(())
    }
}

fn check_ascending(label: &str, warning: f64, critical: f64) -> SchedulerResult<()> {
    if warning >= critical {
        return Err(SchedulerError::Configuration(format!(
            "{label}告警阈值({warning})必须低于严重阈值({critical})"
        )));
    }
    Ok(())
}
