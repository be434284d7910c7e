use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use rrrspec_core::{
    models::{TasksetKey, TasksetState, Worker, WorkerKey},
    traits::{LiveStateStore, SharedTasksetState},
    SchedulerError, SchedulerResult,
};

/// 进程内的运行期状态存储
///
/// 外层的 `RwLock` 只保护键索引，持有时间很短；Taskset状态本身由各自的
/// `Mutex` 保护，不同Taskset之间不存在锁竞争。
#[derive(Default)]
pub struct InMemoryLiveStore {
    tasksets: RwLock<HashMap<TasksetKey, SharedTasksetState>>,
    owners: RwLock<HashMap<String, TasksetKey>>,
    workers: RwLock<HashMap<WorkerKey, Worker>>,
}

impl InMemoryLiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasksets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasksets.read().await.is_empty()
    }
}

#[async_trait]
impl LiveStateStore for InMemoryLiveStore {
    async fn insert_taskset(&self, state: TasksetState) -> SchedulerResult<SharedTasksetState> {
        let key = state.key().clone();
        {
            let mut owners = self.owners.write().await;
            for task in state.tasks() {
                owners.insert(task.key.to_string(), key.clone());
            }
        }

        let shared = Arc::new(Mutex::new(state));
        let mut tasksets = self.tasksets.write().await;
        if tasksets.contains_key(&key) {
            return Err(SchedulerError::Internal(format!("Taskset键重复: {key}")));
        }
        debug!("登记Taskset运行期状态: {}", key);
        tasksets.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    async fn taskset(&self, key: &TasksetKey) -> SchedulerResult<SharedTasksetState> {
        self.tasksets
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::taskset_not_found(key))
    }

    async fn register_owner(&self, entity_key: &str, taskset: &TasksetKey) -> SchedulerResult<()> {
        self.owners
            .write()
            .await
            .insert(entity_key.to_string(), taskset.clone());
        Ok(())
    }

    async fn owner_of(&self, entity_key: &str) -> SchedulerResult<SharedTasksetState> {
        let owner = self.owners.read().await.get(entity_key).cloned();
        match owner {
            Some(key) => self.taskset(&key).await,
            None => Err(not_found(entity_key)),
        }
    }

    async fn put_worker(&self, worker: Worker) -> SchedulerResult<()> {
        self.workers
            .write()
            .await
            .insert(worker.key.clone(), worker);
        Ok(())
    }

    async fn worker(&self, key: &WorkerKey) -> SchedulerResult<Option<Worker>> {
        Ok(self.workers.read().await.get(key).cloned())
    }

    async fn taskset_keys(&self) -> SchedulerResult<Vec<TasksetKey>> {
        Ok(self.tasksets.read().await.keys().cloned().collect())
    }

    async fn remove_taskset(&self, key: &TasksetKey) -> SchedulerResult<bool> {
        self.owners.write().await.retain(|_, owner| owner != key);
        let removed = self.tasksets.write().await.remove(key).is_some();
        if removed {
            debug!("移除Taskset运行期状态: {}", key);
        }
        Ok(removed)
    }
}

/// 按键中的实体段选择对应的NotFound错误
fn not_found(entity_key: &str) -> SchedulerError {
    let key = entity_key.to_string();
    if entity_key.contains(":trial:") {
        SchedulerError::TrialNotFound { key }
    } else if entity_key.contains(":task:") {
        SchedulerError::TaskNotFound { key }
    } else if entity_key.contains(":slave:") {
        SchedulerError::SlaveNotFound { key }
    } else if entity_key.contains(":worker_log:") {
        SchedulerError::WorkerLogNotFound { key }
    } else {
        SchedulerError::Internal(format!("未登记的实体键: {entity_key}"))
    }
}
