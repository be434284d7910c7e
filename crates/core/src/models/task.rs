use serde::{Deserialize, Serialize};

use super::keys::{TaskKey, TasksetKey, TrialKey};
use super::status::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    pub taskset_key: TasksetKey,
    pub spec_file: String,
    pub status: TaskStatus,
    /// Trial历史，只追加
    pub trial_keys: Vec<TrialKey>,
    pub estimate_sec: Option<i64>,
}

impl Task {
    pub fn new(taskset_key: &TasksetKey, spec_file: &str, estimate_sec: Option<i64>) -> Self {
        Self {
            key: TaskKey::for_spec(taskset_key, spec_file),
            taskset_key: taskset_key.clone(),
            spec_file: spec_file.to_string(),
            status: TaskStatus::Pending,
            trial_keys: Vec::new(),
            estimate_sec,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }
}
