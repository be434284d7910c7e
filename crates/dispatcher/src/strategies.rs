use std::sync::Arc;

use tracing::debug;

use rrrspec_core::{
    models::{RequeuePosition, Task},
    SchedulerError, SchedulerResult,
};

/// 决定失败Task重新入队的位置
pub trait RetryStrategy: Send + Sync {
    fn requeue_position(&self, task: &Task, failed_attempts: usize) -> RequeuePosition;

    fn name(&self) -> &str;
}

/// 重试优先于未执行的Task，缩短重试等待时间
pub struct FrontOfQueueStrategy;

/// 先执行完未尝试过的Task再处理重试
pub struct BackOfQueueStrategy;

impl FrontOfQueueStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FrontOfQueueStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryStrategy for FrontOfQueueStrategy {
    fn requeue_position(&self, task: &Task, failed_attempts: usize) -> RequeuePosition {
        debug!(
            "重试Task放入队首: {} (已失败 {} 次)",
            task.key, failed_attempts
        );
        RequeuePosition::Front
    }

    fn name(&self) -> &str {
        "front"
    }
}

impl BackOfQueueStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BackOfQueueStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryStrategy for BackOfQueueStrategy {
    fn requeue_position(&self, task: &Task, failed_attempts: usize) -> RequeuePosition {
        debug!(
            "重试Task放入队尾: {} (已失败 {} 次)",
            task.key, failed_attempts
        );
        RequeuePosition::Back
    }

    fn name(&self) -> &str {
        "back"
    }
}

/// 按配置名称创建策略
pub fn retry_strategy_from_name(name: &str) -> SchedulerResult<Arc<dyn RetryStrategy>> {
    match name {
        "front" => Ok(Arc::new(FrontOfQueueStrategy::new())),
        "back" => Ok(Arc::new(BackOfQueueStrategy::new())),
        other => Err(SchedulerError::Configuration(format!(
            "未知的重试排队策略: {other}"
        ))),
    }
}
