//! # 配置管理
//!
//! 应用配置模型与加载器。配置来源优先级（由低到高）：
//!
//! 1. 内置默认值（每个字段都有默认值）
//! 2. TOML 配置文件
//! 3. 环境变量覆盖，前缀 `ORCHESTRATOR_`，层级分隔符 `__`，
//!    例如 `ORCHESTRATOR_DETECTION__INTERVAL_SECONDS=600`
//!
//! 加载完成后统一执行 [`AppConfig::validate`]，无效配置在任何循环启动前被拒绝。

pub mod models;

pub use models::*;
