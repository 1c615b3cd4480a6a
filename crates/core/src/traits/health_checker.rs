use async_trait::async_trait;

use crate::models::ComponentHealth;
use crate::SchedulerResult;

/// 健康检查器接口
///
/// 每个检查器负责一个具名组件，返回该组件本轮的健康判定。
/// 返回 `Err` 表示检查器自身出错（区别于目标组件不健康），
/// 监控器会把该组件记录为 `Unknown` 并继续其他检查器。
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// 组件名称，同名检查器注册时互相覆盖
    fn name(&self) -> &str;

    async fn execute(&self) -> SchedulerResult<ComponentHealth>;
}
