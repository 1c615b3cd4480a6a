//! 外部协作者接口
//!
//! 检测、分析以及各子系统的健康探针都在本 crate 之外实现，控制器只通过这里的
//! 接口调用它们。

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

/// 一次检测工作流的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub use_auxiliary_light: bool,
    pub persist_results: bool,
}

/// 检测协作者返回的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub success: bool,
    #[serde(default)]
    pub detection_count: u32,
    /// 协作者给出的时间戳，原样保留
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub error: Option<String>,
}

/// 单日分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub date: NaiveDate,
    pub metrics: BTreeMap<String, f64>,
    pub report_path: Option<PathBuf>,
}

/// 子系统探针的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub healthy: bool,
    pub message: String,
}

impl ProbeReport {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    async fn run_detection(&self, request: &DetectionRequest) -> anyhow::Result<DetectionResult>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// 分析指定日期的数据；该日无数据时返回 `Ok(None)`
    async fn analyze(
        &self,
        date: NaiveDate,
        generate_report: bool,
    ) -> anyhow::Result<Option<AnalysisReport>>;
}

/// 子系统健康探针，同步调用，在阻塞线程池中执行
#[cfg_attr(test, automock)]
pub trait HealthProbe: Send + Sync {
    fn check_health(&self) -> ProbeReport;
}
