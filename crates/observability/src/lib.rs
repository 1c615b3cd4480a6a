//! Observability for the orchestrator: metric store, alert lifecycle,
//! the health monitor with its built-in checkers, and the logging /
//! metrics-export setup used by the binary.

pub mod alerting;
pub mod checkers;
pub mod health_monitor;
pub mod metric_store;
pub mod metrics_collector;
pub mod report;
pub mod structured_logger;
pub mod system_metrics;
pub mod telemetry_setup;

pub use alerting::{AlertManager, AlertOutcome, LogNotificationChannel, NotificationChannel};
pub use health_monitor::{HealthMonitor, CONDITION_HEALTH_CHECK, CONDITION_OFFLINE};
pub use metric_store::MetricStore;
pub use metrics_collector::MetricsCollector;
pub use report::{AlertSummary, HealthReport};
pub use structured_logger::{LogFormat, LoggingConfig, StructuredLogger};
pub use system_metrics::{MetricsSource, SysinfoSampler};
pub use telemetry_setup::{init_metrics_exporter, init_structured_logging};
