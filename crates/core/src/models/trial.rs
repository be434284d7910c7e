use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{SlaveKey, TaskKey, TrialKey};
use super::status::TrialStatus;
use crate::errors::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub key: TrialKey,
    pub task_key: TaskKey,
    pub slave_key: SlaveKey,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stdout: String,
    pub stderr: String,
    pub passed_count: Option<i32>,
    pub pending_count: Option<i32>,
    pub failed_count: Option<i32>,
}

/// Slave上报的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub finished_at: DateTime<Utc>,
    pub status: TrialStatus,
    pub stdout: String,
    pub stderr: String,
    pub passed_count: Option<i32>,
    pub pending_count: Option<i32>,
    pub failed_count: Option<i32>,
}

impl TrialResult {
    pub fn new(status: TrialStatus, finished_at: DateTime<Utc>) -> Self {
        Self {
            finished_at,
            status,
            stdout: String::new(),
            stderr: String::new(),
            passed_count: None,
            pending_count: None,
            failed_count: None,
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_counts(mut self, passed: i32, pending: i32, failed: i32) -> Self {
        self.passed_count = Some(passed);
        self.pending_count = Some(pending);
        self.failed_count = Some(failed);
        self
    }
}

impl Trial {
    pub fn start(task_key: &TaskKey, slave_key: &SlaveKey, started_at: DateTime<Utc>) -> Self {
        Self {
            key: TrialKey::generate(task_key),
            task_key: task_key.clone(),
            slave_key: slave_key.clone(),
            status: TrialStatus::Running,
            started_at,
            finished_at: None,
            stdout: String::new(),
            stderr: String::new(),
            passed_count: None,
            pending_count: None,
            failed_count: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// finished_at 只能写入一次
    pub fn finish(&mut self, result: TrialResult) -> SchedulerResult<()> {
        if self.is_finished() {
            return Err(SchedulerError::TrialAlreadyFinished {
                key: self.key.to_string(),
            });
        }
        if !result.status.is_finished() {
            return Err(SchedulerError::validation(format!(
                "Trial结束状态必须是passed/failed/error: {}",
                result.status
            )));
        }
        self.status = result.status;
        self.finished_at = Some(result.finished_at);
        self.stdout = result.stdout;
        self.stderr = result.stderr;
        self.passed_count = result.passed_count;
        self.pending_count = result.pending_count;
        self.failed_count = result.failed_count;
        Ok(())
    }

    pub fn duration_sec(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}
