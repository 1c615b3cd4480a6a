//! # 数据模型
//!
//! 调度与健康监控引擎的核心数据结构：
//!
//! - [`task`] - 任务状态、调度方式、执行结果与调度统计
//! - [`health`] - 组件健康状态与系统整体健康视图
//! - [`metric`] - 时间序列指标样本
//! - [`alert`] - 告警记录与级别
//!
//! 所有时间字段使用 `DateTime<Utc>`，所有模型实现 `serde` 序列化，
//! 用于状态查询和健康报告导出。

pub mod alert;
pub mod health;
pub mod metric;
pub mod task;

pub use alert::*;
pub use health::*;
pub use metric::*;
pub use task::*;
