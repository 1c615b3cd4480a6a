use std::time::Duration;

use orchestrator_core::config::RetryConfig;

/// 失败任务的重试退避策略
///
/// 第 n 次重试的延迟为 `base * multiplier^(n-1)`，不超过 `max_interval_seconds`，
/// 可叠加随机抖动；最终延迟不超过任务自身的执行间隔。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 计算第 `attempt` 次重试（从1开始）前的等待时间
    pub fn delay_for(&self, attempt: u32, task_interval: Duration) -> Duration {
        let base_interval = self.config.base_interval_seconds as f64;
        let multiplier = self.config.backoff_multiplier;
        let max_interval = self.config.max_interval_seconds as f64;
        let jitter_factor = self.config.jitter_factor;

        // 计算指数退避间隔
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential_interval = base_interval * multiplier.powi(exponent);

        // 限制最大间隔
        let capped_interval = exponential_interval.min(max_interval);

        // 添加随机抖动以避免雷群效应
        let jitter = if jitter_factor > 0.0 {
            capped_interval * jitter_factor * (rand::random::<f64>() - 0.5) * 2.0
        } else {
            0.0
        };
        let final_interval = (capped_interval + jitter).max(base_interval);

        Duration::from_secs_f64(final_interval).min(task_interval)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
