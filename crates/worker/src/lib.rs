//! 工作流控制器
//!
//! 调度器任务背后的业务层：调用外部协作者完成检测与分析，聚合各子系统探针的健康
//! 状况，并维护滚动性能统计。

pub mod collaborators;
pub mod command;
pub mod controller;
pub mod errors;
pub mod performance;
pub mod probe_checker;

pub use collaborators::{
    AnalysisBackend, AnalysisReport, DetectionBackend, DetectionRequest, DetectionResult,
    HealthProbe, ProbeReport,
};
pub use command::{CommandAnalysis, CommandDetection, CommandProbe};
pub use controller::{DetectionRecord, HealthCheckReport, WorkflowController};
pub use errors::{CollaboratorErrorKind, WorkflowError, WorkflowResult};
pub use performance::{LatencyTrend, PerformanceReport, PerformanceTracker, WorkflowKind};
pub use probe_checker::ProbeChecker;
