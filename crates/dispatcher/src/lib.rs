//! 调度服务层
//!
//! 提供Taskset队列与重试状态机（`TaskQueueService`）、Worker/Slave登记
//! （`WorkerRegistry`）以及生命周期事件分发（`Notificator`）。

pub mod notificator;
pub mod queue_service;
pub mod strategies;
pub mod worker_registry;

pub use notificator::*;
pub use queue_service::*;
pub use strategies::*;
pub use worker_registry::*;
