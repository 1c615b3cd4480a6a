use async_trait::async_trait;
use orchestrator_core::models::{ComponentHealth, HealthStatus};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::SchedulerResult;
use std::time::Instant;
use sysinfo::Components;

use super::{classify_rising, join_failure};

/// Hottest sensor against warning/critical limits. No readable sensor is `Offline`.
pub struct TemperatureChecker {
    name: String,
    warning_celsius: f64,
    critical_celsius: f64,
}

impl TemperatureChecker {
    pub fn new(name: impl Into<String>, warning_celsius: f64, critical_celsius: f64) -> Self {
        Self {
            name: name.into(),
            warning_celsius,
            critical_celsius,
        }
    }
}

#[async_trait]
impl HealthChecker for TemperatureChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let started = Instant::now();

        let readings = tokio::task::spawn_blocking(|| {
            Components::new_with_refreshed_list()
                .list()
                .iter()
                .filter_map(|c| c.temperature().map(|t| (c.label().to_string(), t as f64)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| join_failure(&self.name, e))?;

        let mut health = evaluate_readings(
            &self.name,
            &readings,
            self.warning_celsius,
            self.critical_celsius,
        );
        health.check_latency_ms = started.elapsed().as_millis() as u64;
        Ok(health)
    }
}

pub fn evaluate_readings(
    name: &str,
    readings: &[(String, f64)],
    warning_celsius: f64,
    critical_celsius: f64,
) -> ComponentHealth {
    let hottest = readings
        .iter()
        .filter(|(_, t)| t.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((label, celsius)) = hottest else {
        return ComponentHealth::offline(name, "no temperature sensors available");
    };

    let status = classify_rising(*celsius, warning_celsius, critical_celsius);
    let mut health = ComponentHealth::new(name, status).with_metric("max_celsius", *celsius);
    if status != HealthStatus::Healthy {
        health = health.with_error(format!("{label} at {celsius:.1}°C"));
    }
    health
}
