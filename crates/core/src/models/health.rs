use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 组件健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
    Critical,
    Unknown,
    Offline,
}

impl HealthStatus {
    /// 用于聚合的严重程度排序：Critical > Error > Warning > 其余
    ///
    /// `Unknown` 和 `Offline` 在排序上视为非致命，与 `Healthy` 同级。
    pub fn severity_rank(&self) -> u8 {
        match self {
            HealthStatus::Critical => 3,
            HealthStatus::Error => 2,
            HealthStatus::Warning => 1,
            HealthStatus::Healthy | HealthStatus::Unknown | HealthStatus::Offline => 0,
        }
    }

    /// Warning、Error、Critical 视为异常
    pub fn is_abnormal(&self) -> bool {
        self.severity_rank() > 0
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
            HealthStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单个组件的健康检查结果
///
/// 每个检查周期覆盖写入，同一时刻每个已注册组件只保留一条记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub check_latency_ms: u64,
    pub error_message: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

impl ComponentHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            last_check: Utc::now(),
            check_latency_ms: 0,
            error_message: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Healthy)
    }

    pub fn unknown(component: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Unknown).with_error(error)
    }

    pub fn offline(component: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Offline).with_error(error)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// 系统整体健康视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub open_alerts: usize,
    pub checked_at: DateTime<Utc>,
    pub uptime_seconds: u64,
}

impl SystemHealth {
    /// 按严重程度聚合整体状态；没有任何组件时为 `Unknown`
    pub fn aggregate_status<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> HealthStatus {
        let mut seen_any = false;
        let mut worst = HealthStatus::Healthy;
        for status in statuses {
            seen_any = true;
            if status.severity_rank() > worst.severity_rank() {
                worst = *status;
            }
        }
        if seen_any {
            worst
        } else {
            HealthStatus::Unknown
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.component == name)
    }
}
