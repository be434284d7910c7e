//! In-memory mock of the live state store for dispatcher tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rrrspec_core::models::{TaskSpec, TasksetConfig, TasksetKey, TasksetState, Worker, WorkerKey};
use rrrspec_core::traits::{LiveStateStore, SharedTasksetState};
use rrrspec_core::{SchedulerError, SchedulerResult};

#[derive(Default)]
pub struct MockLiveStateStore {
    tasksets: Mutex<HashMap<TasksetKey, SharedTasksetState>>,
    owners: Mutex<HashMap<String, TasksetKey>>,
    workers: Mutex<HashMap<WorkerKey, Worker>>,
}

impl MockLiveStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LiveStateStore for MockLiveStateStore {
    async fn insert_taskset(&self, state: TasksetState) -> SchedulerResult<SharedTasksetState> {
        let key = state.key().clone();
        {
            let mut owners = self.owners.lock().unwrap();
            for task in state.tasks() {
                owners.insert(task.key.to_string(), key.clone());
            }
        }
        let shared = Arc::new(tokio::sync::Mutex::new(state));
        self.tasksets
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    async fn taskset(&self, key: &TasksetKey) -> SchedulerResult<SharedTasksetState> {
        self.tasksets
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::taskset_not_found(key))
    }

    async fn register_owner(&self, entity_key: &str, taskset: &TasksetKey) -> SchedulerResult<()> {
        self.owners
            .lock()
            .unwrap()
            .insert(entity_key.to_string(), taskset.clone());
        Ok(())
    }

    async fn owner_of(&self, entity_key: &str) -> SchedulerResult<SharedTasksetState> {
        let owner = self.owners.lock().unwrap().get(entity_key).cloned();
        match owner {
            Some(key) => self.taskset(&key).await,
            None => Err(SchedulerError::Internal(format!(
                "no owner registered for {entity_key}"
            ))),
        }
    }

    async fn put_worker(&self, worker: Worker) -> SchedulerResult<()> {
        self.workers
            .lock()
            .unwrap()
            .insert(worker.key.clone(), worker);
        Ok(())
    }

    async fn worker(&self, key: &WorkerKey) -> SchedulerResult<Option<Worker>> {
        Ok(self.workers.lock().unwrap().get(key).cloned())
    }

    async fn taskset_keys(&self) -> SchedulerResult<Vec<TasksetKey>> {
        Ok(self.tasksets.lock().unwrap().keys().cloned().collect())
    }

    async fn remove_taskset(&self, key: &TasksetKey) -> SchedulerResult<bool> {
        self.owners.lock().unwrap().retain(|_, owner| owner != key);
        Ok(self.tasksets.lock().unwrap().remove(key).is_some())
    }
}

pub fn taskset_config(max_trials: i32) -> TasksetConfig {
    TasksetConfig {
        rsync_name: "app".to_string(),
        setup_command: "bundle install".to_string(),
        slave_command: "bundle exec rspec".to_string(),
        worker_type: "default".to_string(),
        taskset_class: "app-master".to_string(),
        max_workers: 4,
        max_trials,
    }
}

pub fn specs(count: usize) -> Vec<TaskSpec> {
    (0..count)
        .map(|i| TaskSpec::new(format!("spec/feature_{i}_spec.rb")))
        .collect()
}
