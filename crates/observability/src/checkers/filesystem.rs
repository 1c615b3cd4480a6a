use async_trait::async_trait;
use orchestrator_core::models::{ComponentHealth, HealthStatus};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::SchedulerResult;
use std::path::{Path, PathBuf};
use std::time::Instant;
use sysinfo::Disks;

use super::{join_failure, worst};
use crate::system_metrics::{disk_for_path, percent};

/// Free space and writability of the filesystem holding `path`.
pub struct FilesystemChecker {
    name: String,
    path: PathBuf,
    warning_free_percent: f64,
    critical_free_percent: f64,
}

impl FilesystemChecker {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        warning_free_percent: f64,
        critical_free_percent: f64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            warning_free_percent,
            critical_free_percent,
        }
    }

    fn check_blocking(
        name: &str,
        path: &Path,
        warning_free_percent: f64,
        critical_free_percent: f64,
    ) -> ComponentHealth {
        if !path.exists() {
            return ComponentHealth::offline(name, format!("path {} does not exist", path.display()));
        }

        let writable = probe_writable(path);
        let disks = Disks::new_with_refreshed_list();
        let Some(disk) = disk_for_path(&disks, path) else {
            return ComponentHealth::unknown(
                name,
                format!("no mounted filesystem found for {}", path.display()),
            );
        };
        let free_percent = percent(disk.available_space(), disk.total_space());

        evaluate_free_space(
            name,
            free_percent,
            writable,
            warning_free_percent,
            critical_free_percent,
        )
        .with_metric("free_gb", disk.available_space() as f64 / 1_073_741_824.0)
    }
}

#[async_trait]
impl HealthChecker for FilesystemChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> SchedulerResult<ComponentHealth> {
        let started = Instant::now();
        let name = self.name.clone();
        let path = self.path.clone();
        let (warning, critical) = (self.warning_free_percent, self.critical_free_percent);

        let mut health = tokio::task::spawn_blocking(move || {
            Self::check_blocking(&name, &path, warning, critical)
        })
        .await
        .map_err(|e| join_failure(&self.name, e))?;

        health.check_latency_ms = started.elapsed().as_millis() as u64;
        Ok(health)
    }
}

/// Lower free space is worse; an unwritable filesystem is at least `Error`.
pub fn evaluate_free_space(
    name: &str,
    free_percent: f64,
    writable: Result<(), String>,
    warning_free_percent: f64,
    critical_free_percent: f64,
) -> ComponentHealth {
    let space_status = if free_percent < critical_free_percent {
        HealthStatus::Critical
    } else if free_percent < warning_free_percent {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    let health = match writable {
        Ok(()) => {
            let health = ComponentHealth::new(name, space_status);
            if space_status.is_healthy() {
                health
            } else {
                health.with_error(format!("only {free_percent:.1}% free space left"))
            }
        }
        Err(reason) => ComponentHealth::new(name, worst(HealthStatus::Error, space_status))
            .with_error(format!("filesystem not writable: {reason}")),
    };
    health.with_metric("free_percent", free_percent)
}

fn probe_writable(path: &Path) -> Result<(), String> {
    let dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    let probe = dir.join(format!(".orchestrator_write_probe_{}", std::process::id()));
    std::fs::write(&probe, b"ok").map_err(|e| e.to_string())?;
    std::fs::remove_file(&probe).map_err(|e| e.to_string())
}
