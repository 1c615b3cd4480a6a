//! 任务动作接口
//!
//! 调度器只认识 [`TaskAction`]：一个无参数、返回成功/失败及可选消息的异步调用。
//! 业务层（工作流控制器、自定义任务）通过实现该接口或使用 [`action_fn`]
//! 将闭包包装为动作。

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::models::TaskOutcome;

#[async_trait]
pub trait TaskAction: Send + Sync {
    /// 执行一次任务动作
    ///
    /// 动作内部的错误应转换为失败结果返回；panic 由调度器捕获并按失败计数。
    async fn execute(&self) -> TaskOutcome;
}

/// 基于闭包的任务动作
pub struct FnAction<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
{
    async fn execute(&self) -> TaskOutcome {
        (self.func)().await
    }
}

/// 将返回 `Future<Output = TaskOutcome>` 的闭包包装为共享任务动作
pub fn action_fn<F, Fut>(func: F) -> Arc<dyn TaskAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
{
    Arc::new(FnAction { func })
}
