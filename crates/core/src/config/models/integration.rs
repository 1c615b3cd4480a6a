use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 工作流控制器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 内存中保留的检测结果条数
    pub history_capacity: usize,
    /// 性能统计窗口内保留的执行记录条数
    pub performance_window: usize,
    /// 成功率低于该值时在性能报告中给出建议
    pub success_rate_warning: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            performance_window: 1000,
            success_rate_warning: 0.9,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.history_capacity == 0 || self.performance_window == 0 {
            return Err(SchedulerError::Configuration(
                "历史容量和性能窗口必须大于0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.success_rate_warning) {
            return Err(SchedulerError::Configuration(
                "成功率告警阈值必须在0.0到1.0之间".to_string(),
            ));
        }
        Ok(())
    }
}

/// 外部命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// 子系统健康探针命令，退出码 0 表示健康
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// 外部协作者（检测、分析、子系统探针）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// 输出 JSON 检测结果的命令
    pub detection: Option<CommandConfig>,
    /// 以日期 (YYYY-MM-DD) 作为最后一个参数调用的分析命令
    pub analysis: Option<CommandConfig>,
    pub probes: Vec<ProbeConfig>,
}

impl CollaboratorsConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        let commands = self
            .detection
            .iter()
            .chain(self.analysis.iter())
            .map(|c| c.program.as_str())
            .chain(self.probes.iter().map(|p| p.program.as_str()));
        for program in commands {
            if program.trim().is_empty() {
                return Err(SchedulerError::Configuration(
                    "协作者命令不能为空".to_string(),
                ));
            }
        }
        if self.probes.iter().any(|p| p.name.trim().is_empty()) {
            return Err(SchedulerError::Configuration(
                "探针名称不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志与指标导出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// json | pretty | compact
    pub log_format: String,
    /// 配置后启动 Prometheus 抓取端点，例如 "0.0.0.0:9090"
    pub prometheus_listen: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            prometheus_listen: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SchedulerError::Configuration(format!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(SchedulerError::Configuration(format!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format, valid_formats
            )));
        }
        if let Some(addr) = &self.prometheus_listen {
            addr.parse::<std::net::SocketAddr>().map_err(|e| {
                SchedulerError::Configuration(format!("无效的Prometheus监听地址 {addr}: {e}"))
            })?;
        }
        Ok(())
    }
}
