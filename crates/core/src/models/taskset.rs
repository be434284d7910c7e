use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::TasksetKey;
use super::status::TasksetStatus;
use crate::errors::{SchedulerError, SchedulerResult};

/// 创建Taskset时由客户端提交的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksetConfig {
    pub rsync_name: String,
    pub setup_command: String,
    pub slave_command: String,
    pub worker_type: String,
    pub taskset_class: String,
    pub max_workers: i32,
    pub max_trials: i32,
}

impl TasksetConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_workers <= 0 {
            return Err(SchedulerError::validation(format!(
                "max_workers必须大于0: {}",
                self.max_workers
            )));
        }
        if self.max_trials <= 0 {
            return Err(SchedulerError::validation(format!(
                "max_trials必须大于0: {}",
                self.max_trials
            )));
        }
        Ok(())
    }
}

/// 单个spec文件的调度请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub spec_file: String,
    /// 历史平均耗时，未提供时由调用方根据持久化历史补全
    pub estimate_sec: Option<i64>,
}

impl TaskSpec {
    pub fn new(spec_file: impl Into<String>) -> Self {
        Self {
            spec_file: spec_file.into(),
            estimate_sec: None,
        }
    }

    pub fn with_estimate(mut self, estimate_sec: i64) -> Self {
        self.estimate_sec = Some(estimate_sec);
        self
    }
}

pub fn validate_task_specs(specs: &[TaskSpec]) -> SchedulerResult<()> {
    if specs.is_empty() {
        return Err(SchedulerError::validation("任务列表不能为空"));
    }
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        if spec.spec_file.is_empty() {
            return Err(SchedulerError::validation("spec_file不能为空"));
        }
        if !seen.insert(spec.spec_file.as_str()) {
            return Err(SchedulerError::validation(format!(
                "重复的spec_file: {}",
                spec.spec_file
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taskset {
    pub key: TasksetKey,
    #[serde(flatten)]
    pub config: TasksetConfig,
    pub log: String,
    pub status: TasksetStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Taskset {
    pub fn new(key: TasksetKey, config: TasksetConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            config,
            log: String::new(),
            status: TasksetStatus::Pending,
            created_at,
            finished_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}
