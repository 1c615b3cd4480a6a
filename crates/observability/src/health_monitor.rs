use chrono::Utc;
use futures::future::join_all;
use orchestrator_core::config::MonitorConfig;
use orchestrator_core::models::{
    Alert, AlertSeverity, ComponentHealth, HealthStatus, Metric, SystemHealth,
};
use orchestrator_core::traits::HealthChecker;
use orchestrator_core::{SchedulerError, SchedulerResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerting::{AlertManager, NotificationChannel};
use crate::metric_store::MetricStore;
use crate::metrics_collector::MetricsCollector;
use crate::report::{current_hostname, report_file_name, AlertSummary, HealthReport};
use crate::structured_logger::StructuredLogger;
use crate::system_metrics::{MetricsSource, SysinfoSampler};

/// Alert condition for `Warning | Error | Critical` checker verdicts.
pub const CONDITION_HEALTH_CHECK: &str = "health_check";
/// Alert condition for `Offline` checker verdicts.
pub const CONDITION_OFFLINE: &str = "offline";

/// Continuous health and resource observation, independent of task scheduling.
///
/// Owns two loops: the health-check loop runs every registered checker, the
/// metrics loop samples the system through a [`MetricsSource`]. Both loops log
/// per-iteration errors and retry after a fixed backoff.
pub struct HealthMonitor {
    config: MonitorConfig,
    checkers: RwLock<BTreeMap<String, Arc<dyn HealthChecker>>>,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
    metric_store: MetricStore,
    alerts: AlertManager,
    metrics_source: Arc<dyn MetricsSource>,
    collector: MetricsCollector,
    created_at: Instant,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let metric_store = MetricStore::new(
            Duration::from_secs(config.metric_retention_hours.saturating_mul(3600)),
            config.max_samples_per_metric,
        );
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            checkers: RwLock::new(BTreeMap::new()),
            components: RwLock::new(BTreeMap::new()),
            metric_store,
            alerts: AlertManager::new(),
            metrics_source: Arc::new(SysinfoSampler::new(".")),
            collector: MetricsCollector::new(),
            created_at: Instant::now(),
            running: AtomicBool::new(false),
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = source;
        self
    }

    pub fn with_notification_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.alerts.add_notification_channel(channel);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Registers a checker; a checker with the same name is replaced.
    pub async fn register_health_checker(&self, checker: Arc<dyn HealthChecker>) {
        let name = checker.name().to_string();
        let replaced = self
            .checkers
            .write()
            .await
            .insert(name.clone(), checker)
            .is_some();
        if replaced {
            warn!(component = %name, "Health checker replaced");
        } else {
            info!(component = %name, "Health checker registered");
        }
        self.components
            .write()
            .await
            .entry(name)
            .or_insert_with_key(|name| ComponentHealth::unknown(name.as_str(), "not checked yet"));
    }

    pub async fn unregister_health_checker(&self, name: &str) -> bool {
        let removed = self.checkers.write().await.remove(name).is_some();
        if removed {
            self.components.write().await.remove(name);
            info!(component = %name, "Health checker unregistered");
        }
        removed
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start_monitoring(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.shutdown_tx.send_replace(false);

        let health_loop = tokio::spawn(Arc::clone(self).health_check_loop(self.shutdown_tx.subscribe()));
        let metrics_loop = tokio::spawn(Arc::clone(self).metrics_loop(self.shutdown_tx.subscribe()));
        self.loops.lock().await.extend([health_loop, metrics_loop]);

        info!(
            health_check_interval_seconds = self.config.health_check_interval_seconds,
            metrics_interval_seconds = self.config.metrics_interval_seconds,
            "Health monitoring started"
        );
        Ok(())
    }

    /// Signals both loops and waits for them to exit. Calling it while stopped is a no-op.
    pub async fn stop_monitoring(&self) -> SchedulerResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.loops.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Monitoring loop terminated abnormally: {}", e);
            }
        }
        info!("Health monitoring stopped");
        Ok(())
    }

    async fn health_check_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.health_check_interval_seconds);
        let backoff = Duration::from_secs(self.config.loop_error_backoff_seconds);

        while !*shutdown.borrow() {
            let wait = match self.run_health_checks().await {
                Ok(_) => period,
                Err(e) => {
                    StructuredLogger::log_system_error("health_monitor", "run_health_checks", &e);
                    backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("Health check loop stopped");
    }

    async fn metrics_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.metrics_interval_seconds);
        let backoff = Duration::from_secs(self.config.loop_error_backoff_seconds);

        while !*shutdown.borrow() {
            let wait = match self.collect_system_metrics().await {
                Ok(_) => period,
                Err(e) => {
                    StructuredLogger::log_system_error("health_monitor", "collect_system_metrics", &e);
                    backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("Metrics collection loop stopped");
    }

    /// Runs every registered checker concurrently and applies the verdicts.
    ///
    /// A checker that errors, panics or exceeds the timeout is recorded as
    /// `Unknown` and never prevents the other checkers from running.
    pub async fn run_health_checks(&self) -> SchedulerResult<Vec<ComponentHealth>> {
        let checkers: Vec<(String, Arc<dyn HealthChecker>)> = self
            .checkers
            .read()
            .await
            .iter()
            .map(|(name, checker)| (name.clone(), Arc::clone(checker)))
            .collect();
        let timeout = Duration::from_secs(self.config.checker_timeout_seconds);

        let runs = checkers.into_iter().map(|(name, checker)| async move {
            let started = Instant::now();
            let outcome = tokio::spawn(async move {
                tokio::time::timeout(timeout, checker.execute()).await
            })
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let mut health = match outcome {
                Ok(Ok(Ok(health))) => health,
                Ok(Ok(Err(e))) => {
                    StructuredLogger::log_system_error("health_monitor", &name, &e);
                    ComponentHealth::unknown(name.as_str(), e.to_string())
                }
                Ok(Err(_)) => ComponentHealth::unknown(
                    name.as_str(),
                    format!("health check timed out after {}s", timeout.as_secs()),
                ),
                Err(e) => ComponentHealth::unknown(name.as_str(), format!("health checker panicked: {e}")),
            };
            health.component = name;
            if health.check_latency_ms == 0 {
                health.check_latency_ms = elapsed_ms;
            }
            health
        });

        let results = join_all(runs).await;
        for health in &results {
            self.apply_health(health.clone()).await;
        }
        self.collector.update_open_alerts(self.alerts.open_count().await);
        Ok(results)
    }

    async fn apply_health(&self, health: ComponentHealth) {
        if !self.checkers.read().await.contains_key(&health.component) {
            debug!(component = %health.component, "Dropping result of unregistered checker");
            return;
        }

        StructuredLogger::log_health_check(
            &health.component,
            health.status,
            health.check_latency_ms,
            health.error_message.as_deref(),
        );
        self.collector
            .record_health_check(&health.component, health.status, health.check_latency_ms);

        let component = health.component.as_str();
        let message = health
            .error_message
            .clone()
            .unwrap_or_else(|| format!("{component} reported {}", health.status));

        match health.status {
            HealthStatus::Healthy => {
                self.alerts.resolve(component, None).await;
            }
            HealthStatus::Offline => {
                self.alerts
                    .resolve(component, Some(CONDITION_HEALTH_CHECK))
                    .await;
                self.alerts
                    .raise(component, CONDITION_OFFLINE, AlertSeverity::Error, &message)
                    .await;
            }
            HealthStatus::Unknown => {}
            status => {
                if let Some(severity) = AlertSeverity::from_health(status) {
                    self.alerts.resolve(component, Some(CONDITION_OFFLINE)).await;
                    self.alerts
                        .raise(component, CONDITION_HEALTH_CHECK, severity, &message)
                        .await;
                }
            }
        }

        self.components
            .write()
            .await
            .insert(health.component.clone(), health);
    }

    /// Samples the configured source and records every sample.
    pub async fn collect_system_metrics(&self) -> SchedulerResult<usize> {
        let source = Arc::clone(&self.metrics_source);
        let samples = tokio::task::spawn_blocking(move || source.collect())
            .await
            .map_err(|e| SchedulerError::Internal(format!("metrics sampler panicked: {e}")))??;

        for metric in &samples {
            self.collector.record_system_metric(&metric.name, metric.value);
        }
        let count = samples.len();
        self.metric_store.record_all(samples).await;
        debug!(samples = count, "System metrics recorded");
        Ok(count)
    }

    pub async fn record_metric(&self, metric: Metric) {
        self.metric_store.record(metric).await;
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        let components: Vec<ComponentHealth> =
            self.components.read().await.values().cloned().collect();
        let overall = SystemHealth::aggregate_status(components.iter().map(|c| &c.status));
        SystemHealth {
            overall,
            components,
            open_alerts: self.alerts.open_count().await,
            checked_at: Utc::now(),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub async fn get_component_health(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    /// Samples of `name` within the trailing `window_hours`, oldest first.
    pub async fn get_metric_history(&self, name: &str, window_hours: u64) -> Vec<Metric> {
        self.metric_store
            .history(name, Duration::from_secs(window_hours.saturating_mul(3600)))
            .await
    }

    pub async fn get_current_metrics(&self) -> BTreeMap<String, Metric> {
        self.metric_store.latest().await
    }

    pub async fn get_alerts(&self, active_only: bool) -> Vec<Alert> {
        self.alerts.get_alerts(active_only).await
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> SchedulerResult<Alert> {
        self.alerts.acknowledge(alert_id).await
    }

    /// Opens or refreshes an alert that does not originate from a checker.
    pub async fn raise_alert(
        &self,
        component: &str,
        condition: &str,
        severity: AlertSeverity,
        message: &str,
    ) -> Alert {
        let outcome = self.alerts.raise(component, condition, severity, message).await;
        self.collector.update_open_alerts(self.alerts.open_count().await);
        outcome.alert().clone()
    }

    /// Resolves every open alert of `component`; returns how many were resolved.
    pub async fn resolve_alerts(&self, component: &str) -> usize {
        let resolved = self.alerts.resolve(component, None).await.len();
        self.collector.update_open_alerts(self.alerts.open_count().await);
        resolved
    }

    pub async fn build_report(&self) -> HealthReport {
        let health = self.get_system_health().await;
        HealthReport {
            generated_at: Utc::now(),
            hostname: current_hostname(),
            monitor_uptime_seconds: health.uptime_seconds,
            overall_status: health.overall,
            components: health.components,
            current_metrics: self.get_current_metrics().await,
            alerts: AlertSummary::from_history(
                self.alerts.get_alerts(false).await,
                self.alerts.active_counts_by_severity().await,
            ),
        }
    }

    /// Writes a timestamped JSON report into `dir` and returns its path.
    pub async fn export_report(&self, dir: impl AsRef<Path>) -> SchedulerResult<PathBuf> {
        let report = self.build_report().await;
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(report_file_name(report.generated_at));
        let body = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(&path, body).await?;

        StructuredLogger::log_report_exported(&path, report.overall_status);
        Ok(path)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }
}
