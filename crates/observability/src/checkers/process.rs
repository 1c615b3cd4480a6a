use async_trait::async_trait;
use orchestrator_core::models::{ComponentHealth, HealthStatus};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::SchedulerResult;
use std::time::Instant;
use sysinfo::{ProcessesToUpdate, System};

use super::join_failure;

/// Liveness of a named process; no running instance is `Critical`.
pub struct ProcessChecker {
    name: String,
    process_name: String,
}

impl ProcessChecker {
    pub fn new(name: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            process_name: process_name.into(),
        }
    }
}

#[async_trait]
impl HealthChecker for ProcessChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let started = Instant::now();
        let process_name = self.process_name.clone();

        let instances = tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            sys.processes()
                .values()
                .filter(|p| p.name().to_string_lossy() == process_name.as_str())
                .count()
        })
        .await
        .map_err(|e| join_failure(&self.name, e))?;

        let mut health = evaluate_instances(&self.name, &self.process_name, instances);
        health.check_latency_ms = started.elapsed().as_millis() as u64;
        Ok(health)
    }
}

pub fn evaluate_instances(name: &str, process_name: &str, instances: usize) -> ComponentHealth {
    let health = if instances == 0 {
        ComponentHealth::new(name, HealthStatus::Critical)
            .with_error(format!("process {process_name} is not running"))
    } else {
        ComponentHealth::healthy(name)
    };
    health.with_metric("instances", instances as f64)
}
