use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{SlaveKey, TaskKey, TasksetKey, TrialKey};
use super::status::{TasksetStatus, TrialStatus};

/// 调度生命周期事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    TasksetCreated {
        taskset_key: TasksetKey,
        task_count: usize,
        occurred_at: DateTime<Utc>,
    },
    TaskDequeued {
        taskset_key: TasksetKey,
        task_key: TaskKey,
        occurred_at: DateTime<Utc>,
    },
    TrialStarted {
        taskset_key: TasksetKey,
        task_key: TaskKey,
        trial_key: TrialKey,
        slave_key: SlaveKey,
        occurred_at: DateTime<Utc>,
    },
    TrialFinished {
        taskset_key: TasksetKey,
        task_key: TaskKey,
        trial_key: TrialKey,
        status: TrialStatus,
        occurred_at: DateTime<Utc>,
    },
    TasksetFinished {
        taskset_key: TasksetKey,
        status: TasksetStatus,
        occurred_at: DateTime<Utc>,
    },
    TasksetFailed {
        taskset_key: TasksetKey,
        occurred_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn taskset_key(&self) -> &TasksetKey {
        match self {
            Notification::TasksetCreated { taskset_key, .. }
            | Notification::TaskDequeued { taskset_key, .. }
            | Notification::TrialStarted { taskset_key, .. }
            | Notification::TrialFinished { taskset_key, .. }
            | Notification::TasksetFinished { taskset_key, .. }
            | Notification::TasksetFailed { taskset_key, .. } => taskset_key,
        }
    }

    /// Taskset生命周期事件同时投递到全局频道
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Notification::TasksetCreated { .. }
                | Notification::TasksetFinished { .. }
                | Notification::TasksetFailed { .. }
        )
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Notification::TasksetCreated { .. } => "taskset_created",
            Notification::TaskDequeued { .. } => "task_dequeued",
            Notification::TrialStarted { .. } => "trial_started",
            Notification::TrialFinished { .. } => "trial_finished",
            Notification::TasksetFinished { .. } => "taskset_finished",
            Notification::TasksetFailed { .. } => "taskset_failed",
        }
    }
}
