pub mod app_config;
pub mod integration;
pub mod monitoring;
pub mod scheduling;

pub use app_config::AppConfig;
pub use integration::{CollaboratorsConfig, CommandConfig, ControllerConfig, ObservabilityConfig, ProbeConfig};
pub use monitoring::{MonitorConfig, ThresholdsConfig};
pub use scheduling::{parse_daily_time, AnalysisConfig, DetectionConfig, RetryConfig, SchedulerConfig};
