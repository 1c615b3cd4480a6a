use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    integration::{CollaboratorsConfig, ControllerConfig, ObservabilityConfig},
    monitoring::{MonitorConfig, ThresholdsConfig},
    scheduling::{AnalysisConfig, DetectionConfig, SchedulerConfig},
};
use crate::errors::{SchedulerError, SchedulerResult};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/orchestrator.toml",
    "orchestrator.toml",
    "/etc/orchestrator/config.toml",
];

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub detection: DetectionConfig,
    pub analysis: AnalysisConfig,
    pub monitor: MonitorConfig,
    pub thresholds: ThresholdsConfig,
    pub controller: ControllerConfig,
    pub collaborators: CollaboratorsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 指定路径不存在时返回错误；未指定路径时依次尝试默认路径，
    /// 都不存在则只使用内置默认值和环境变量。
    pub fn load(config_path: Option<&Path>) -> SchedulerResult<Self> {
        let mut builder = ConfigBuilder::builder();

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(SchedulerError::Configuration(format!(
                        "配置文件不存在: {}",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .map(Path::new)
                    .find(|p| p.exists())
                {
                    builder = builder.add_source(File::from(path).format(FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("thresholds.watched_processes"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> SchedulerResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| SchedulerError::Configuration(format!("解析TOML配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SchedulerResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SchedulerError::Serialization(format!("序列化配置为TOML失败: {e}")))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> SchedulerResult<()> {
        self.scheduler.validate()?;
        self.detection.validate()?;
        self.analysis.validate()?;
        self.monitor.validate()?;
        self.thresholds.validate()?;
        self.controller.validate()?;
        self.collaborators.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
