use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use orchestrator_core::models::{ComponentHealth, HealthStatus};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::{SchedulerError, SchedulerResult};

use crate::collaborators::HealthProbe;

/// 把子系统探针适配为监控器的健康检查器
///
/// 探针报告不健康时组件状态为 `Error`，探针本身 panic 时返回检查器错误。
pub struct ProbeChecker {
    name: String,
    probe: Arc<dyn HealthProbe>,
}

impl ProbeChecker {
    pub fn new(name: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }
}

#[async_trait]
impl HealthChecker for ProbeChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let started = Instant::now();
        let probe = Arc::clone(&self.probe);
        let report = tokio::task::spawn_blocking(move || probe.check_health())
            .await
            .map_err(|e| SchedulerError::CheckerFailed {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        let mut health = if report.healthy {
            ComponentHealth::healthy(self.name.as_str())
        } else {
            ComponentHealth::new(self.name.as_str(), HealthStatus::Error).with_error(report.message)
        };
        health.check_latency_ms = started.elapsed().as_millis() as u64;
        Ok(health)
    }
}
