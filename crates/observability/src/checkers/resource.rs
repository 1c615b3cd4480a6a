use async_trait::async_trait;
use orchestrator_core::models::ComponentHealth;
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::{SchedulerError, SchedulerResult};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sysinfo::System;

use super::{classify_rising, join_failure, worst};
use crate::system_metrics::percent;

/// CPU and memory usage against (warning, critical) percentages.
pub struct ResourceChecker {
    name: String,
    cpu: (f64, f64),
    memory: (f64, f64),
    // kept between checks so CPU usage is measured over the check interval
    sys: Arc<Mutex<System>>,
}

impl ResourceChecker {
    pub fn new(name: impl Into<String>, cpu: (f64, f64), memory: (f64, f64)) -> Self {
        Self {
            name: name.into(),
            cpu,
            memory,
            sys: Arc::new(Mutex::new(System::new())),
        }
    }
}

#[async_trait]
impl HealthChecker for ResourceChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let started = Instant::now();
        let sys = Arc::clone(&self.sys);
        let name = self.name.clone();

        let (cpu_percent, memory_percent) = tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|e| SchedulerError::CheckerFailed {
                name,
                message: format!("system lock poisoned: {e}"),
            })?;
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            Ok::<_, SchedulerError>((
                sys.global_cpu_usage() as f64,
                percent(sys.used_memory(), sys.total_memory()),
            ))
        })
        .await
        .map_err(|e| join_failure(&self.name, e))??;

        let mut health = evaluate_usage(&self.name, cpu_percent, memory_percent, self.cpu, self.memory);
        health.check_latency_ms = started.elapsed().as_millis() as u64;
        Ok(health)
    }
}

pub fn evaluate_usage(
    name: &str,
    cpu_percent: f64,
    memory_percent: f64,
    cpu: (f64, f64),
    memory: (f64, f64),
) -> ComponentHealth {
    let cpu_status = classify_rising(cpu_percent, cpu.0, cpu.1);
    let memory_status = classify_rising(memory_percent, memory.0, memory.1);
    let status = worst(cpu_status, memory_status);

    let mut problems = Vec::new();
    if cpu_status.is_abnormal() {
        problems.push(format!("CPU {cpu_percent:.1}%"));
    }
    if memory_status.is_abnormal() {
        problems.push(format!("memory {memory_percent:.1}%"));
    }

    let mut health = ComponentHealth::new(name, status)
        .with_metric("cpu_percent", cpu_percent)
        .with_metric("memory_percent", memory_percent);
    if !problems.is_empty() {
        health = health.with_error(problems.join(", "));
    }
    health
}
