//! Built-in health checkers. Each one is a self-contained strategy
//! behind the `HealthChecker` trait; the monitor has no special cases.

pub mod filesystem;
pub mod process;
pub mod resource;
pub mod temperature;

pub use filesystem::FilesystemChecker;
pub use process::ProcessChecker;
pub use resource::ResourceChecker;
pub use temperature::TemperatureChecker;

use orchestrator_core::config::ThresholdsConfig;
use orchestrator_core::models::HealthStatus;
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::SchedulerError;
use std::sync::Arc;

/// Checkers derived from threshold configuration.
pub fn builtin_checkers(thresholds: &ThresholdsConfig) -> Vec<Arc<dyn HealthChecker>> {
    let mut checkers: Vec<Arc<dyn HealthChecker>> = vec![
        Arc::new(FilesystemChecker::new(
            "filesystem",
            &thresholds.disk_path,
            thresholds.disk_warning_free_percent,
            thresholds.disk_critical_free_percent,
        )),
        Arc::new(ResourceChecker::new(
            "system_resources",
            (thresholds.cpu_warning_percent, thresholds.cpu_critical_percent),
            (
                thresholds.memory_warning_percent,
                thresholds.memory_critical_percent,
            ),
        )),
    ];

    if thresholds.temperature_check_enabled {
        checkers.push(Arc::new(TemperatureChecker::new(
            "temperature",
            thresholds.temperature_warning_celsius,
            thresholds.temperature_critical_celsius,
        )));
    }

    for process in &thresholds.watched_processes {
        checkers.push(Arc::new(ProcessChecker::new(
            format!("process:{process}"),
            process.clone(),
        )));
    }

    checkers
}

/// Higher is worse.
pub(crate) fn classify_rising(value: f64, warning: f64, critical: f64) -> HealthStatus {
    if value >= critical {
        HealthStatus::Critical
    } else if value >= warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

pub(crate) fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    if b.severity_rank() > a.severity_rank() {
        b
    } else {
        a
    }
}

pub(crate) fn join_failure(name: &str, err: tokio::task::JoinError) -> SchedulerError {
    SchedulerError::CheckerFailed {
        name: name.to_string(),
        message: err.to_string(),
    }
}
