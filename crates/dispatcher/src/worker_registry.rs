use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use rrrspec_core::{
    models::{
        Slave, SlaveKey, SlaveStatus, TasksetKey, TrialKey, Worker, WorkerKey, WorkerLog,
        WorkerLogKey,
    },
    traits::LiveStateStore,
    SchedulerError, SchedulerResult, SharedTasksetState,
};

/// Worker、Slave及WorkerLog的登记服务
///
/// Slave和WorkerLog保存在所属Taskset的状态中，修改时持有该Taskset的锁。
pub struct WorkerRegistry {
    store: Arc<dyn LiveStateStore>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn LiveStateStore>) -> Self {
        Self { store }
    }

    /// 首次出现的Worker会被创建；传入None解除绑定
    pub async fn current_taskset(
        &self,
        worker_key: &WorkerKey,
        taskset_key: Option<&TasksetKey>,
    ) -> SchedulerResult<Worker> {
        if let Some(taskset_key) = taskset_key {
            self.store.taskset(taskset_key).await?;
        }
        let mut worker = self
            .store
            .worker(worker_key)
            .await?
            .unwrap_or_else(|| Worker::new(worker_key.clone()));
        worker.current_taskset = taskset_key.cloned();
        self.store.put_worker(worker.clone()).await?;

        match &worker.current_taskset {
            Some(taskset) => info!("Worker {} 绑定Taskset {}", worker_key, taskset),
            None => info!("Worker {} 解除绑定", worker_key),
        }
        Ok(worker)
    }

    pub async fn current_trial(
        &self,
        slave_key: &SlaveKey,
        trial_key: Option<&TrialKey>,
    ) -> SchedulerResult<()> {
        let shared = self.store.owner_of(slave_key.as_str()).await?;
        let mut state = shared.lock().await;
        if let Some(trial_key) = trial_key {
            state.trial(trial_key)?;
        }
        let slave = state.slave_mut(slave_key)?;
        slave.current_trial = trial_key.cloned();
        slave.status = match trial_key {
            Some(_) => SlaveStatus::Running,
            None => SlaveStatus::Idle,
        };
        debug!("Slave {} 当前Trial: {:?}", slave_key, trial_key);
        Ok(())
    }

    pub async fn create_worker_log(&self, worker_key: &WorkerKey) -> SchedulerResult<WorkerLog> {
        let (taskset_key, shared) = self.bound_taskset(worker_key).await?;
        let worker_log = WorkerLog::new(worker_key, &taskset_key);
        shared.lock().await.add_worker_log(worker_log.clone());
        self.store
            .register_owner(worker_log.key.as_str(), &taskset_key)
            .await?;
        debug!("创建WorkerLog: {}", worker_log.key);
        Ok(worker_log)
    }

    pub async fn append_worker_log_log(
        &self,
        key: &WorkerLogKey,
        text: &str,
    ) -> SchedulerResult<()> {
        self.update_worker_log(key, |worker_log| worker_log.log.push_str(text))
            .await
    }

    pub async fn set_rsync_finished_time(
        &self,
        key: &WorkerLogKey,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.update_worker_log(key, |worker_log| worker_log.rsync_finished_at = Some(at))
            .await
    }

    pub async fn set_setup_finished_time(
        &self,
        key: &WorkerLogKey,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.update_worker_log(key, |worker_log| worker_log.setup_finished_at = Some(at))
            .await
    }

    pub async fn set_worker_finished_time(
        &self,
        key: &WorkerLogKey,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.update_worker_log(key, |worker_log| worker_log.worker_finished_at = Some(at))
            .await
    }

    pub async fn finish_worker_log(&self, key: &WorkerLogKey) -> SchedulerResult<()> {
        self.update_worker_log(key, |worker_log| worker_log.finished = true)
            .await
    }

    pub async fn create_slave(&self, worker_key: &WorkerKey, name: &str) -> SchedulerResult<Slave> {
        if name.is_empty() {
            return Err(SchedulerError::validation("Slave名称不能为空"));
        }
        let (taskset_key, shared) = self.bound_taskset(worker_key).await?;
        let slave = Slave::new(worker_key, &taskset_key, name);
        shared.lock().await.add_slave(slave.clone());
        self.store
            .register_owner(slave.key.as_str(), &taskset_key)
            .await?;
        debug!("创建Slave: {}", slave.key);
        Ok(slave)
    }

    pub async fn append_slave_log(&self, key: &SlaveKey, text: &str) -> SchedulerResult<()> {
        let shared = self.store.owner_of(key.as_str()).await?;
        let mut state = shared.lock().await;
        state.slave_mut(key)?.log.push_str(text);
        Ok(())
    }

    pub async fn finish_slave(&self, key: &SlaveKey) -> SchedulerResult<()> {
        let shared = self.store.owner_of(key.as_str()).await?;
        let mut state = shared.lock().await;
        let slave = state.slave_mut(key)?;
        slave.status = SlaveStatus::Finished;
        slave.current_trial = None;
        debug!("Slave结束: {}", key);
        Ok(())
    }

    pub async fn append_taskset_log(&self, key: &TasksetKey, text: &str) -> SchedulerResult<()> {
        let shared = self.store.taskset(key).await?;
        shared.lock().await.append_log(text);
        Ok(())
    }

    async fn bound_taskset(
        &self,
        worker_key: &WorkerKey,
    ) -> SchedulerResult<(TasksetKey, SharedTasksetState)> {
        let worker = self
            .store
            .worker(worker_key)
            .await?
            .ok_or_else(|| SchedulerError::WorkerNotFound {
                key: worker_key.to_string(),
            })?;
        let taskset_key = worker
            .current_taskset
            .ok_or_else(|| SchedulerError::WorkerNotBound {
                key: worker_key.to_string(),
            })?;
        let shared = self.store.taskset(&taskset_key).await?;
        Ok((taskset_key, shared))
    }

    async fn update_worker_log<F>(&self, key: &WorkerLogKey, update: F) -> SchedulerResult<()>
    where
        F: FnOnce(&mut WorkerLog) + Send,
    {
        let shared = self.store.owner_of(key.as_str()).await?;
        let mut state = shared.lock().await;
        update(state.worker_log_mut(key)?);
        Ok(())
    }
}
