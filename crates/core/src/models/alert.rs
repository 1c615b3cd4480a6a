use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::HealthStatus;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// 将异常的健康状态映射为告警级别，非异常状态返回 `None`
    pub fn from_health(status: HealthStatus) -> Option<Self> {
        match status {
            HealthStatus::Warning => Some(AlertSeverity::Warning),
            HealthStatus::Error => Some(AlertSeverity::Error),
            HealthStatus::Critical => Some(AlertSeverity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// 告警记录
///
/// 同一 (component, condition) 同时最多只有一条未解决的告警；
/// 组件恢复健康后告警被标记为已解决而不是删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub component: String,
    pub condition: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// 最近一次被刷新的时间
    pub last_seen_at: DateTime<Utc>,
    /// 触发次数（包含首次）
    pub occurrences: u32,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(
        component: impl Into<String>,
        condition: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            component: component.into(),
            condition: condition.into(),
            severity,
            message: message.into(),
            created_at: now,
            last_seen_at: now,
            occurrences: 1,
            resolved: false,
            resolved_at: None,
            acknowledged: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}
