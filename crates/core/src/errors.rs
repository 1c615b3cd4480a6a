use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("无效的执行间隔: {seconds}秒 (最小为1秒)")]
    InvalidInterval { seconds: u64 },

    #[error("无效的每日执行时间: {value} - {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("调度器已在运行")]
    AlreadyRunning,

    #[error("调度器未运行")]
    NotRunning,

    #[error("等待任务结束超时 ({timeout_seconds}秒)")]
    ShutdownTimeout { timeout_seconds: u64 },

    #[error("告警未找到: {id}")]
    AlertNotFound { id: String },

    #[error("健康检查器 {name} 执行失败: {message}")]
    CheckerFailed { name: String, message: String },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SchedulerError {
    fn from(err: config::ConfigError) -> Self {
        SchedulerError::Configuration(err.to_string())
    }
}

impl SchedulerError {
    /// 是否属于注册阶段的配置类错误
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidInterval { .. }
                | SchedulerError::InvalidTimeFormat { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::Configuration(_)
        )
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
pub type SchedulerResult<T> = Result<T>;
