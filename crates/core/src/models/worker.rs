use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{SlaveKey, TasksetKey, TrialKey, WorkerKey, WorkerLogKey};
use super::status::SlaveStatus;

/// Worker节点，同一时刻只绑定一个Taskset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub key: WorkerKey,
    pub current_taskset: Option<TasksetKey>,
}

impl Worker {
    pub fn new(key: WorkerKey) -> Self {
        Self {
            key,
            current_taskset: None,
        }
    }
}

/// Worker上运行测试的子进程
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slave {
    pub key: SlaveKey,
    pub worker_key: WorkerKey,
    pub taskset_key: TasksetKey,
    pub log: String,
    pub current_trial: Option<TrialKey>,
    pub status: SlaveStatus,
}

impl Slave {
    pub fn new(worker_key: &WorkerKey, taskset_key: &TasksetKey, name: &str) -> Self {
        Self {
            key: SlaveKey::generate(worker_key, name),
            worker_key: worker_key.clone(),
            taskset_key: taskset_key.clone(),
            log: String::new(),
            current_trial: None,
            status: SlaveStatus::Idle,
        }
    }
}

/// Worker准备阶段（rsync、setup）的耗时与日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLog {
    pub key: WorkerLogKey,
    pub worker_key: WorkerKey,
    pub taskset_key: TasksetKey,
    pub rsync_finished_at: Option<DateTime<Utc>>,
    pub setup_finished_at: Option<DateTime<Utc>>,
    pub worker_finished_at: Option<DateTime<Utc>>,
    pub log: String,
    pub finished: bool,
}

impl WorkerLog {
    pub fn new(worker_key: &WorkerKey, taskset_key: &TasksetKey) -> Self {
        Self {
            key: WorkerLogKey::generate(worker_key),
            worker_key: worker_key.clone(),
            taskset_key: taskset_key.clone(),
            rsync_finished_at: None,
            setup_finished_at: None,
            worker_finished_at: None,
            log: String::new(),
            finished: false,
        }
    }
}
