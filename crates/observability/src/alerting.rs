use anyhow::Result;
use chrono::Utc;
use orchestrator_core::models::{Alert, AlertSeverity};
use orchestrator_core::{SchedulerError, SchedulerResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

use crate::structured_logger::StructuredLogger;

/// Receives alerts when they are first opened.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn send_alert(&self, alert: &Alert) -> Result<()>;
}

pub struct LogNotificationChannel;

impl NotificationChannel for LogNotificationChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn send_alert(&self, alert: &Alert) -> Result<()> {
        StructuredLogger::log_alert_opened(alert);
        Ok(())
    }
}

/// Result of raising an alert for a (component, condition) pair.
#[derive(Debug, Clone)]
pub enum AlertOutcome {
    Opened(Alert),
    Refreshed(Alert),
}

impl AlertOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertOutcome::Opened(alert) | AlertOutcome::Refreshed(alert) => alert,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AlertOutcome::Opened(_))
    }
}

#[derive(Default)]
struct AlertBook {
    /// full history in creation order
    alerts: Vec<Alert>,
    /// (component, condition) -> index of the unresolved alert
    open: HashMap<(String, String), usize>,
}

/// Alert lifecycle: open, refresh, resolve, acknowledge.
///
/// At most one unresolved alert exists per (component, condition).
/// Resolved alerts stay in history for the lifetime of the process.
pub struct AlertManager {
    book: RwLock<AlertBook>,
    notification_channels: Vec<Arc<dyn NotificationChannel>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self {
            book: RwLock::new(AlertBook::default()),
            notification_channels: Vec::new(),
        }
    }

    pub fn add_notification_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.notification_channels.push(channel);
    }

    pub async fn raise(
        &self,
        component: &str,
        condition: &str,
        severity: AlertSeverity,
        message: &str,
    ) -> AlertOutcome {
        let outcome = {
            let mut book = self.book.write().await;
            let key = (component.to_string(), condition.to_string());
            match book.open.get(&key).copied() {
                Some(index) => {
                    let alert = &mut book.alerts[index];
                    alert.severity = severity;
                    alert.message = message.to_string();
                    alert.last_seen_at = Utc::now();
                    alert.occurrences += 1;
                    AlertOutcome::Refreshed(alert.clone())
                }
                None => {
                    let alert = Alert::new(component, condition, severity, message);
                    book.alerts.push(alert.clone());
                    let index = book.alerts.len() - 1;
                    book.open.insert(key, index);
                    AlertOutcome::Opened(alert)
                }
            }
        };

        match &outcome {
            AlertOutcome::Opened(alert) => self.notify(alert),
            AlertOutcome::Refreshed(alert) => StructuredLogger::log_alert_refreshed(alert),
        }
        outcome
    }

    /// Resolve open alerts of `component`; all conditions when `condition` is `None`.
    pub async fn resolve(&self, component: &str, condition: Option<&str>) -> Vec<Alert> {
        let mut book = self.book.write().await;
        let keys: Vec<(String, String)> = book
            .open
            .keys()
            .filter(|(c, cond)| c == component && condition.map_or(true, |wanted| wanted == cond))
            .cloned()
            .collect();

        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(index) = book.open.remove(&key) {
                let alert = &mut book.alerts[index];
                alert.resolve();
                StructuredLogger::log_alert_resolved(alert);
                resolved.push(alert.clone());
            }
        }
        resolved
    }

    /// Marks an alert acknowledged without resolving it.
    pub async fn acknowledge(&self, alert_id: &str) -> SchedulerResult<Alert> {
        let mut book = self.book.write().await;
        let alert = book
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| SchedulerError::AlertNotFound {
                id: alert_id.to_string(),
            })?;
        alert.acknowledged = true;
        StructuredLogger::log_alert_acknowledged(alert);
        Ok(alert.clone())
    }

    pub async fn get_alerts(&self, active_only: bool) -> Vec<Alert> {
        let book = self.book.read().await;
        book.alerts
            .iter()
            .filter(|a| !active_only || a.is_active())
            .cloned()
            .collect()
    }

    pub async fn open_count(&self) -> usize {
        self.book.read().await.open.len()
    }

    /// Unresolved alerts grouped by severity.
    pub async fn active_counts_by_severity(&self) -> BTreeMap<String, usize> {
        let book = self.book.read().await;
        let mut counts = BTreeMap::new();
        for &index in book.open.values() {
            *counts
                .entry(book.alerts[index].severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    fn notify(&self, alert: &Alert) {
        if self.notification_channels.is_empty() {
            StructuredLogger::log_alert_opened(alert);
            return;
        }
        for channel in &self.notification_channels {
            if let Err(e) = channel.send_alert(alert) {
                error!(
                    channel = channel.name(),
                    alert.id = %alert.id,
                    "Failed to send alert to notification channel: {}",
                    e
                );
            }
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}
