use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{TasksetKey, TasksetState, Worker, WorkerKey};
use crate::SchedulerResult;

/// 单个Taskset的状态及其锁，锁的作用域即一个Taskset
pub type SharedTasksetState = Arc<Mutex<TasksetState>>;

/// 运行期状态存储
///
/// 保存执行中的Taskset及Worker绑定关系。所有Taskset级别的修改都通过
/// 取得 `SharedTasksetState` 的锁完成，存储本身只负责按键查找。
///
/// # 归属索引
///
/// Task、Trial、Slave、WorkerLog只能通过所属Taskset修改。调用方用
/// `register_owner` 登记子实体键，之后用 `owner_of` 找回所属Taskset。
#[async_trait]
pub trait LiveStateStore: Send + Sync {
    /// 保存新Taskset并登记其全部Task
    async fn insert_taskset(&self, state: TasksetState) -> SchedulerResult<SharedTasksetState>;

    /// 按键查找Taskset
    ///
    /// # 错误
    ///
    /// * `TasksetNotFound` - 键不存在
    async fn taskset(&self, key: &TasksetKey) -> SchedulerResult<SharedTasksetState>;

    async fn register_owner(&self, entity_key: &str, taskset: &TasksetKey) -> SchedulerResult<()>;

    /// 查找子实体所属的Taskset
    async fn owner_of(&self, entity_key: &str) -> SchedulerResult<SharedTasksetState>;

    async fn put_worker(&self, worker: Worker) -> SchedulerResult<()>;

    async fn worker(&self, key: &WorkerKey) -> SchedulerResult<Option<Worker>>;

    async fn taskset_keys(&self) -> SchedulerResult<Vec<TasksetKey>>;

    /// 移除Taskset及登记在其名下的子实体键，返回键是否存在
    async fn remove_taskset(&self, key: &TasksetKey) -> SchedulerResult<bool>;
}
