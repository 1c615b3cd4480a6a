use orchestrator_core::models::Metric;
use orchestrator_core::{SchedulerError, SchedulerResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};
use tracing::debug;

/// Source of periodic system samples for the metrics loop.
///
/// Implementations may block; the monitor calls them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSource: Send + Sync {
    fn collect(&self) -> SchedulerResult<Vec<Metric>>;
}

/// sysinfo based sampler: CPU, memory, disk, network, uptime and load.
pub struct SysinfoSampler {
    sys: Mutex<System>,
    disk_path: PathBuf,
}

impl SysinfoSampler {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            disk_path: disk_path.into(),
        }
    }
}

impl MetricsSource for SysinfoSampler {
    fn collect(&self) -> SchedulerResult<Vec<Metric>> {
        let mut metrics = Vec::with_capacity(12);

        {
            let mut sys = self
                .sys
                .lock()
                .map_err(|e| SchedulerError::Internal(format!("system lock poisoned: {e}")))?;
            sys.refresh_cpu_usage();
            sys.refresh_memory();

            metrics.push(
                Metric::gauge("system.cpu_percent", sys.global_cpu_usage() as f64, "%")
                    .with_description("global CPU usage"),
            );

            let used = sys.used_memory();
            let total = sys.total_memory();
            metrics.push(Metric::gauge("system.memory_used_mb", bytes_to_mb(used), "MB"));
            metrics.push(
                Metric::gauge("system.memory_percent", percent(used, total), "%")
                    .with_description("used / total physical memory"),
            );
        }

        let disks = Disks::new_with_refreshed_list();
        if let Some(disk) = disk_for_path(&disks, &self.disk_path) {
            let total = disk.total_space();
            let available = disk.available_space();
            metrics.push(
                Metric::gauge("system.disk_percent", percent(total.saturating_sub(available), total), "%")
                    .with_tag("mount", disk.mount_point().to_string_lossy().to_string()),
            );
            metrics.push(
                Metric::gauge("system.disk_free_gb", available as f64 / 1_073_741_824.0, "GB")
                    .with_tag("mount", disk.mount_point().to_string_lossy().to_string()),
            );
        }

        let networks = Networks::new_with_refreshed_list();
        let (rx, tx) = networks
            .list()
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_name, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });
        metrics.push(Metric::counter("system.network_rx_bytes", rx as f64, "bytes"));
        metrics.push(Metric::counter("system.network_tx_bytes", tx as f64, "bytes"));

        metrics.push(Metric::gauge(
            "system.uptime_seconds",
            System::uptime() as f64,
            "s",
        ));
        let load = System::load_average();
        metrics.push(Metric::gauge("system.load_1m", load.one, ""));
        metrics.push(Metric::gauge("system.load_5m", load.five, ""));
        metrics.push(Metric::gauge("system.load_15m", load.fifteen, ""));

        debug!(samples = metrics.len(), "System metrics sampled");
        Ok(metrics)
    }
}

/// Disk whose mount point is the longest prefix of `path`.
pub(crate) fn disk_for_path<'a>(disks: &'a Disks, path: &Path) -> Option<&'a sysinfo::Disk> {
    let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
}

pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}
