//! 已结束Taskset的持久化形态
//!
//! 日志字段保存为内联文本或外部文件路径二者之一，由Persister决定。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::keys::{SlaveKey, TaskKey, TasksetKey, TrialKey, WorkerKey, WorkerLogKey};
use super::state::TasksetState;
use super::status::{SlaveStatus, TaskStatus, TasksetStatus, TrialStatus};
use super::taskset::TasksetConfig;
use crate::errors::{SchedulerError, SchedulerResult};

/// 内联文本或外部文件引用
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogText {
    pub text: Option<String>,
    pub path: Option<String>,
}

impl LogText {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            path: None,
        }
    }

    pub fn external(path: impl Into<String>) -> Self {
        Self {
            text: None,
            path: Some(path.into()),
        }
    }

    fn insert_into(&self, object: &mut Map<String, Value>, name: &str) {
        object.insert(name.to_string(), json!(self.text));
        object.insert(format!("{name}_path"), json!(self.path));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTaskset {
    pub key: TasksetKey,
    pub config: TasksetConfig,
    pub status: TasksetStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: LogText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTask {
    pub key: TaskKey,
    pub taskset_key: TasksetKey,
    pub spec_file: String,
    pub status: TaskStatus,
    pub estimate_sec: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTrial {
    pub key: TrialKey,
    pub task_key: TaskKey,
    pub slave_key: SlaveKey,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stdout: LogText,
    pub stderr: LogText,
    pub passed_count: Option<i32>,
    pub pending_count: Option<i32>,
    pub failed_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSlave {
    pub key: SlaveKey,
    pub worker_key: WorkerKey,
    pub status: SlaveStatus,
    pub log: LogText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedWorkerLog {
    pub key: WorkerLogKey,
    pub worker_key: WorkerKey,
    pub rsync_finished_at: Option<DateTime<Utc>>,
    pub setup_finished_at: Option<DateTime<Utc>>,
    pub worker_finished_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub log: LogText,
}

/// 一个Taskset的完整持久化快照。集合顺序即写入顺序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksetSnapshot {
    pub taskset: PersistedTaskset,
    pub tasks: Vec<PersistedTask>,
    /// 按Task顺序、再按开始顺序排列
    pub trials: Vec<PersistedTrial>,
    pub slaves: Vec<PersistedSlave>,
    pub worker_logs: Vec<PersistedWorkerLog>,
}

impl TasksetSnapshot {
    /// 从已结束的Taskset截取快照。
    ///
    /// 只保留 finished_at 不晚于 Taskset.finished_at 的Trial，
    /// 未结束和迟到的Trial都不进入快照。
    pub fn capture(state: &TasksetState) -> SchedulerResult<Self> {
        let taskset = state.taskset();
        let Some(cutoff) = taskset.finished_at.filter(|_| taskset.is_closed()) else {
            return Err(SchedulerError::TasksetNotClosed {
                key: taskset.key.to_string(),
            });
        };

        let mut tasks = Vec::with_capacity(state.tasks().len());
        let mut trials = Vec::new();
        for task in state.tasks() {
            tasks.push(PersistedTask {
                key: task.key.clone(),
                taskset_key: task.taskset_key.clone(),
                spec_file: task.spec_file.clone(),
                status: task.status,
                estimate_sec: task.estimate_sec,
            });
            trials.extend(
                state
                    .trials_of(task)
                    .filter(|trial| matches!(trial.finished_at, Some(at) if at <= cutoff))
                    .map(|trial| PersistedTrial {
                        key: trial.key.clone(),
                        task_key: trial.task_key.clone(),
                        slave_key: trial.slave_key.clone(),
                        status: trial.status,
                        started_at: trial.started_at,
                        finished_at: trial.finished_at,
                        stdout: LogText::inline(trial.stdout.clone()),
                        stderr: LogText::inline(trial.stderr.clone()),
                        passed_count: trial.passed_count,
                        pending_count: trial.pending_count,
                        failed_count: trial.failed_count,
                    }),
            );
        }

        let slaves = state
            .slaves()
            .iter()
            .map(|slave| PersistedSlave {
                key: slave.key.clone(),
                worker_key: slave.worker_key.clone(),
                status: slave.status,
                log: LogText::inline(slave.log.clone()),
            })
            .collect();

        let worker_logs = state
            .worker_logs()
            .iter()
            .map(|worker_log| PersistedWorkerLog {
                key: worker_log.key.clone(),
                worker_key: worker_log.worker_key.clone(),
                rsync_finished_at: worker_log.rsync_finished_at,
                setup_finished_at: worker_log.setup_finished_at,
                worker_finished_at: worker_log.worker_finished_at,
                finished: worker_log.finished,
                log: LogText::inline(worker_log.log.clone()),
            })
            .collect();

        Ok(Self {
            taskset: PersistedTaskset {
                key: taskset.key.clone(),
                config: taskset.config.clone(),
                status: taskset.status,
                created_at: taskset.created_at,
                finished_at: taskset.finished_at,
                log: LogText::inline(taskset.log.clone()),
            },
            tasks,
            trials,
            slaves,
            worker_logs,
        })
    }

    /// Taskset行本身，不含子实体
    pub fn as_short_json(&self) -> Value {
        let taskset = &self.taskset;
        let config = &taskset.config;
        let mut object = Map::new();
        object.insert("key".into(), json!(taskset.key));
        object.insert("rsync_name".into(), json!(config.rsync_name));
        object.insert("setup_command".into(), json!(config.setup_command));
        object.insert("slave_command".into(), json!(config.slave_command));
        object.insert("worker_type".into(), json!(config.worker_type));
        object.insert("taskset_class".into(), json!(config.taskset_class));
        object.insert("max_workers".into(), json!(config.max_workers));
        object.insert("max_trials".into(), json!(config.max_trials));
        object.insert("status".into(), json!(taskset.status));
        object.insert("created_at".into(), json!(taskset.created_at));
        object.insert("finished_at".into(), json!(taskset.finished_at));
        taskset.log.insert_into(&mut object, "log");
        Value::Object(object)
    }

    pub fn as_full_json(&self) -> Value {
        let mut object = match self.as_short_json() {
            Value::Object(object) => object,
            _ => Map::new(),
        };

        let tasks: Vec<Value> = self
            .tasks
            .iter()
            .map(|task| {
                let trials: Vec<Value> = self
                    .trials
                    .iter()
                    .filter(|trial| trial.task_key == task.key)
                    .map(trial_json)
                    .collect();
                json!({
                    "key": task.key,
                    "taskset": { "key": task.taskset_key },
                    "spec_file": task.spec_file,
                    "status": task.status,
                    "estimate_sec": task.estimate_sec,
                    "trials": trials,
                })
            })
            .collect();

        let slaves: Vec<Value> = self
            .slaves
            .iter()
            .map(|slave| {
                let trials: Vec<Value> = self
                    .trials
                    .iter()
                    .filter(|trial| trial.slave_key == slave.key)
                    .map(|trial| json!({ "key": trial.key }))
                    .collect();
                let mut object = Map::new();
                object.insert("key".into(), json!(slave.key));
                object.insert("worker_key".into(), json!(slave.worker_key));
                object.insert("status".into(), json!(slave.status));
                object.insert("trials".into(), Value::Array(trials));
                slave.log.insert_into(&mut object, "log");
                Value::Object(object)
            })
            .collect();

        let worker_logs: Vec<Value> = self
            .worker_logs
            .iter()
            .map(|worker_log| {
                let mut object = Map::new();
                object.insert("key".into(), json!(worker_log.key));
                object.insert("worker".into(), json!({ "key": worker_log.worker_key }));
                object.insert("rsync_finished_at".into(), json!(worker_log.rsync_finished_at));
                object.insert("setup_finished_at".into(), json!(worker_log.setup_finished_at));
                object.insert("worker_finished_at".into(), json!(worker_log.worker_finished_at));
                object.insert("finished".into(), json!(worker_log.finished));
                worker_log.log.insert_into(&mut object, "log");
                Value::Object(object)
            })
            .collect();

        object.insert("tasks".into(), Value::Array(tasks));
        object.insert("slaves".into(), Value::Array(slaves));
        object.insert("worker_logs".into(), Value::Array(worker_logs));
        Value::Object(object)
    }
}

fn trial_json(trial: &PersistedTrial) -> Value {
    let mut object = Map::new();
    object.insert("key".into(), json!(trial.key));
    object.insert("task".into(), json!({ "key": trial.task_key }));
    object.insert("slave".into(), json!({ "key": trial.slave_key }));
    object.insert("status".into(), json!(trial.status));
    object.insert("started_at".into(), json!(trial.started_at));
    object.insert("finished_at".into(), json!(trial.finished_at));
    object.insert("passed".into(), json!(trial.passed_count));
    object.insert("pending".into(), json!(trial.pending_count));
    object.insert("failed".into(), json!(trial.failed_count));
    trial.stdout.insert_into(&mut object, "stdout");
    trial.stderr.insert_into(&mut object, "stderr");
    Value::Object(object)
}
