//! # orchestrator-core
//!
//! 调度与健康编排引擎的共享基础：错误类型、领域模型、能力接口与配置。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::{SchedulerError, SchedulerResult};
pub use models::*;
pub use traits::{action_fn, HealthChecker, TaskAction};
