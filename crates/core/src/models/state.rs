//! # Taskset运行时状态
//!
//! 单个Taskset在执行期间的权威内存状态：待执行队列、每个Task的Trial历史、
//! 以及Slave/WorkerLog记录。所有修改都在该Taskset自己的锁内完成，
//! 这里只包含纯粹的状态迁移，不涉及锁、存储和通知。
//!
//! ## 状态流转
//!
//! ```text
//! Taskset: pending → running(首次出队) → finished | failed
//! Task:    pending → running(Trial开始) → passed | pending(重新入队) | failed(重试耗尽)
//! ```
//!
//! Taskset进入终态之后结束的Trial只做记录，不再影响Task和Taskset的状态。

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{SlaveKey, TaskKey, TasksetKey, TrialKey, WorkerLogKey};
use super::status::{TaskStatus, TasksetStatus, TrialStatus};
use super::task::Task;
use super::taskset::{validate_task_specs, TaskSpec, Taskset, TasksetConfig};
use super::trial::{Trial, TrialResult};
use super::worker::{Slave, WorkerLog};
use crate::errors::{SchedulerError, SchedulerResult};

/// 重新入队的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequeuePosition {
    Front,
    Back,
}

/// Trial结束对所属Task的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialFinish {
    /// Task通过
    Passed,
    /// 仍有重试预算，需要重新入队
    Retry { failed_attempts: usize },
    /// 重试预算耗尽，Task失败
    Exhausted,
    /// Taskset已结束，仅做审计记录
    Stale,
    /// Task已是终态，结果不再生效
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksetStatusSummary {
    pub key: TasksetKey,
    pub status: TasksetStatus,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub passed_tasks: usize,
    pub failed_tasks: usize,
    pub queue_length: usize,
    pub running_trials: usize,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TasksetState {
    taskset: Taskset,
    tasks: Vec<Task>,
    task_index: HashMap<TaskKey, usize>,
    queue: VecDeque<TaskKey>,
    /// 已出队但尚未开始Trial的Task
    in_flight: HashSet<TaskKey>,
    trials: HashMap<TrialKey, Trial>,
    /// Taskset开启期间开始、尚未结束的Trial
    running: HashSet<TrialKey>,
    slaves: Vec<Slave>,
    worker_logs: Vec<WorkerLog>,
}

impl TasksetState {
    pub fn new(
        key: TasksetKey,
        config: TasksetConfig,
        specs: &[TaskSpec],
        created_at: DateTime<Utc>,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        validate_task_specs(specs)?;

        let tasks: Vec<Task> = specs
            .iter()
            .map(|spec| Task::new(&key, &spec.spec_file, spec.estimate_sec))
            .collect();
        let task_index = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.key.clone(), i))
            .collect();
        let queue = tasks.iter().map(|task| task.key.clone()).collect();

        Ok(Self {
            taskset: Taskset::new(key, config, created_at),
            tasks,
            task_index,
            queue,
            in_flight: HashSet::new(),
            trials: HashMap::new(),
            running: HashSet::new(),
            slaves: Vec::new(),
            worker_logs: Vec::new(),
        })
    }

    pub fn key(&self) -> &TasksetKey {
        &self.taskset.key
    }

    pub fn taskset(&self) -> &Taskset {
        &self.taskset
    }

    pub fn status(&self) -> TasksetStatus {
        self.taskset.status
    }

    pub fn is_closed(&self) -> bool {
        self.taskset.is_closed()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, key: &TaskKey) -> SchedulerResult<&Task> {
        self.task_index
            .get(key)
            .map(|&i| &self.tasks[i])
            .ok_or_else(|| SchedulerError::task_not_found(key))
    }

    fn task_mut(&mut self, key: &TaskKey) -> SchedulerResult<&mut Task> {
        match self.task_index.get(key) {
            Some(&i) => Ok(&mut self.tasks[i]),
            None => Err(SchedulerError::task_not_found(key)),
        }
    }

    pub fn trial(&self, key: &TrialKey) -> SchedulerResult<&Trial> {
        self.trials
            .get(key)
            .ok_or_else(|| SchedulerError::trial_not_found(key))
    }

    /// 按开始顺序返回某个Task的全部Trial
    pub fn trials_of<'a>(&'a self, task: &'a Task) -> impl Iterator<Item = &'a Trial> + 'a {
        task.trial_keys.iter().filter_map(|key| self.trials.get(key))
    }

    pub fn slaves(&self) -> &[Slave] {
        &self.slaves
    }

    pub fn worker_logs(&self) -> &[WorkerLog] {
        &self.worker_logs
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_trials(&self) -> usize {
        self.running.len()
    }

    /// 取出队首Task；Taskset已结束或队列为空时返回None
    pub fn dequeue(&mut self) -> Option<Task> {
        if self.is_closed() {
            return None;
        }
        while let Some(key) = self.queue.pop_front() {
            let Some(&index) = self.task_index.get(&key) else {
                continue;
            };
            if self.tasks[index].is_settled() {
                continue;
            }
            if self.taskset.status == TasksetStatus::Pending {
                self.taskset.status = TasksetStatus::Running;
            }
            self.in_flight.insert(key);
            return Some(self.tasks[index].clone());
        }
        None
    }

    /// Worker放弃已出队但未开始Trial的Task，放回队首
    pub fn reversed_enqueue(&mut self, key: &TaskKey) -> SchedulerResult<bool> {
        let task = self.task(key)?;
        if self.is_closed() || task.is_settled() || !self.in_flight.contains(key) {
            return Ok(false);
        }
        self.in_flight.remove(key);
        self.task_mut(key)?.status = TaskStatus::Pending;
        self.queue.push_front(key.clone());
        Ok(true)
    }

    pub fn start_trial(
        &mut self,
        task_key: &TaskKey,
        slave_key: &SlaveKey,
        started_at: DateTime<Utc>,
    ) -> SchedulerResult<Trial> {
        let closed = self.is_closed();
        self.task(task_key)?;
        if !closed && !self.in_flight.contains(task_key) {
            return Err(SchedulerError::TaskNotDequeued {
                key: task_key.to_string(),
            });
        }
        let trial = Trial::start(task_key, slave_key, started_at);

        let task = self.task_mut(task_key)?;
        task.trial_keys.push(trial.key.clone());
        if !closed {
            if !task.is_settled() {
                task.status = TaskStatus::Running;
            }
            self.in_flight.remove(task_key);
            self.running.insert(trial.key.clone());
        }
        self.trials.insert(trial.key.clone(), trial.clone());
        Ok(trial)
    }

    pub fn finish_trial(
        &mut self,
        trial_key: &TrialKey,
        result: TrialResult,
    ) -> SchedulerResult<(Trial, TrialFinish)> {
        let trial = self
            .trials
            .get_mut(trial_key)
            .ok_or_else(|| SchedulerError::trial_not_found(trial_key))?;
        trial.finish(result)?;
        let trial = trial.clone();
        self.running.remove(trial_key);

        if self.is_closed() {
            return Ok((trial, TrialFinish::Stale));
        }

        let max_trials = self.taskset.config.max_trials;
        let failed_attempts = {
            let task = self.task(&trial.task_key)?;
            if task.is_settled() {
                return Ok((trial, TrialFinish::Settled));
            }
            self.trials_of(task)
                .filter(|t| matches!(t.status, TrialStatus::Failed | TrialStatus::Error))
                .count()
        };

        let task = self.task_mut(&trial.task_key)?;
        let outcome = if trial.status.is_successful() {
            task.status = TaskStatus::Passed;
            TrialFinish::Passed
        } else if failed_attempts < max_trials as usize {
            task.status = TaskStatus::Pending;
            TrialFinish::Retry { failed_attempts }
        } else {
            task.status = TaskStatus::Failed;
            TrialFinish::Exhausted
        };
        Ok((trial, outcome))
    }

    pub fn requeue(&mut self, key: &TaskKey, position: RequeuePosition) -> SchedulerResult<()> {
        self.task(key)?;
        if self.queue.contains(key) {
            return Ok(());
        }
        match position {
            RequeuePosition::Front => self.queue.push_front(key.clone()),
            RequeuePosition::Back => self.queue.push_back(key.clone()),
        }
        Ok(())
    }

    /// 队列为空、没有已出队未开始的Task、没有运行中的Trial时结束Taskset。
    /// 只有本次调用完成状态迁移时返回true。
    pub fn try_finish(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_closed() {
            return false;
        }
        if !self.queue.is_empty() || !self.in_flight.is_empty() || !self.running.is_empty() {
            return false;
        }
        self.close(TasksetStatus::Finished, now);
        true
    }

    pub fn fail(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.close(TasksetStatus::Failed, now);
        true
    }

    /// finished_at 不早于已记录的最后一个Trial结束时间，
    /// 避免调用方时钟偏差把正常结束的Trial判成迟到
    fn close(&mut self, status: TasksetStatus, now: DateTime<Utc>) {
        let latest_trial = self.trials.values().filter_map(|t| t.finished_at).max();
        let finished_at = match latest_trial {
            Some(latest) if latest > now => latest,
            _ => now,
        };
        self.taskset.status = status;
        self.taskset.finished_at = Some(finished_at);
        self.in_flight.clear();
    }

    pub fn summary(&self) -> TasksetStatusSummary {
        let count = |status: TaskStatus| self.tasks.iter().filter(|t| t.status == status).count();
        TasksetStatusSummary {
            key: self.taskset.key.clone(),
            status: self.taskset.status,
            total_tasks: self.tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            running_tasks: count(TaskStatus::Running),
            passed_tasks: count(TaskStatus::Passed),
            failed_tasks: count(TaskStatus::Failed),
            queue_length: self.queue.len(),
            running_trials: self.running.len(),
            created_at: self.taskset.created_at,
            finished_at: self.taskset.finished_at,
        }
    }

    pub fn append_log(&mut self, text: &str) {
        self.taskset.log.push_str(text);
    }

    pub fn add_slave(&mut self, slave: Slave) {
        self.slaves.push(slave);
    }

    pub fn slave_mut(&mut self, key: &SlaveKey) -> SchedulerResult<&mut Slave> {
        self.slaves
            .iter_mut()
            .find(|slave| &slave.key == key)
            .ok_or_else(|| SchedulerError::SlaveNotFound {
                key: key.to_string(),
            })
    }

    pub fn add_worker_log(&mut self, worker_log: WorkerLog) {
        self.worker_logs.push(worker_log);
    }

    pub fn worker_log_mut(&mut self, key: &WorkerLogKey) -> SchedulerResult<&mut WorkerLog> {
        self.worker_logs
            .iter_mut()
            .find(|worker_log| &worker_log.key == key)
            .ok_or_else(|| SchedulerError::WorkerLogNotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(max_trials: i32) -> TasksetConfig {
        TasksetConfig {
            rsync_name: "app".to_string(),
            setup_command: "bundle install".to_string(),
            slave_command: "bundle exec rspec".to_string(),
            worker_type: "default".to_string(),
            taskset_class: "app-master".to_string(),
            max_workers: 2,
            max_trials,
        }
    }

    fn state(specs: &[&str], max_trials: i32) -> TasksetState {
        let specs: Vec<TaskSpec> = specs.iter().map(|s| TaskSpec::new(*s)).collect();
        TasksetState::new(TasksetKey::generate(), config(max_trials), &specs, Utc::now()).unwrap()
    }

    fn slave() -> SlaveKey {
        SlaveKey::from("rrrspec:worker:w1:slave:s1:0")
    }

    fn run(state: &mut TasksetState, status: TrialStatus) -> (TaskKey, TrialFinish) {
        let task = state.dequeue().expect("queue should not be empty");
        let trial = state.start_trial(&task.key, &slave(), Utc::now()).unwrap();
        let (_, outcome) = state
            .finish_trial(&trial.key, TrialResult::new(status, Utc::now()))
            .unwrap();
        (task.key, outcome)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let specs = vec![TaskSpec::new("spec/a_spec.rb")];
        let mut bad = config(1);
        bad.max_workers = 0;
        assert!(TasksetState::new(TasksetKey::generate(), bad, &specs, Utc::now()).is_err());
        assert!(TasksetState::new(TasksetKey::generate(), config(0), &specs, Utc::now()).is_err());
        assert!(TasksetState::new(TasksetKey::generate(), config(1), &[], Utc::now()).is_err());

        let duplicated = vec![TaskSpec::new("spec/a_spec.rb"), TaskSpec::new("spec/a_spec.rb")];
        let err = TasksetState::new(TasksetKey::generate(), config(1), &duplicated, Utc::now())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn test_queue_follows_input_order() {
        let mut state = state(&["spec/a_spec.rb", "spec/b_spec.rb", "spec/c_spec.rb"], 1);
        assert_eq!(state.status(), TasksetStatus::Pending);

        let order: Vec<String> = std::iter::from_fn(|| state.dequeue())
            .map(|task| task.spec_file)
            .collect();
        assert_eq!(order, vec!["spec/a_spec.rb", "spec/b_spec.rb", "spec/c_spec.rb"]);
        assert_eq!(state.status(), TasksetStatus::Running);
    }

    #[test]
    fn test_retry_until_exhausted() {
        let mut state = state(&["spec/a_spec.rb"], 3);

        let (key, first) = run(&mut state, TrialStatus::Failed);
        assert_eq!(first, TrialFinish::Retry { failed_attempts: 1 });
        state.requeue(&key, RequeuePosition::Front).unwrap();

        let (_, second) = run(&mut state, TrialStatus::Error);
        assert_eq!(second, TrialFinish::Retry { failed_attempts: 2 });
        state.requeue(&key, RequeuePosition::Front).unwrap();

        let (key, third) = run(&mut state, TrialStatus::Failed);
        assert_eq!(third, TrialFinish::Exhausted);

        let task = state.task(&key).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.trial_keys.len(), 3);
        assert!(state.try_finish(Utc::now()));
    }

    #[test]
    fn test_pass_after_failure() {
        let mut state = state(&["spec/a_spec.rb"], 3);
        let (key, _) = run(&mut state, TrialStatus::Failed);
        state.requeue(&key, RequeuePosition::Front).unwrap();
        let (_, outcome) = run(&mut state, TrialStatus::Passed);

        assert_eq!(outcome, TrialFinish::Passed);
        assert_eq!(state.task(&key).unwrap().status, TaskStatus::Passed);
    }

    #[test]
    fn test_try_finish_waits_for_outstanding_work() {
        let mut state = state(&["spec/a_spec.rb"], 1);
        assert!(!state.try_finish(Utc::now()));

        let task = state.dequeue().unwrap();
        assert!(!state.try_finish(Utc::now()), "dequeued task is outstanding");

        let trial = state.start_trial(&task.key, &slave(), Utc::now()).unwrap();
        assert!(!state.try_finish(Utc::now()), "running trial is outstanding");

        state
            .finish_trial(&trial.key, TrialResult::new(TrialStatus::Passed, Utc::now()))
            .unwrap();
        assert!(state.try_finish(Utc::now()));
        assert_eq!(state.status(), TasksetStatus::Finished);
        assert!(!state.try_finish(Utc::now()), "already terminal");
    }

    #[test]
    fn test_stale_trial_does_not_change_status() {
        let mut state = state(&["spec/a_spec.rb"], 2);
        let task = state.dequeue().unwrap();
        let trial = state.start_trial(&task.key, &slave(), Utc::now()).unwrap();

        assert!(state.fail(Utc::now()));
        let finished_at = state.taskset().finished_at.unwrap();

        let (recorded, outcome) = state
            .finish_trial(
                &trial.key,
                TrialResult::new(TrialStatus::Passed, finished_at + Duration::seconds(1)),
            )
            .unwrap();
        assert_eq!(outcome, TrialFinish::Stale);
        assert_eq!(recorded.status, TrialStatus::Passed);
        assert_eq!(state.status(), TasksetStatus::Failed);
        assert_eq!(state.task(&task.key).unwrap().status, TaskStatus::Running);
        assert!(state.dequeue().is_none());
    }

    #[test]
    fn test_finished_at_not_before_last_trial() {
        let mut state = state(&["spec/a_spec.rb"], 1);
        let task = state.dequeue().unwrap();
        let trial = state.start_trial(&task.key, &slave(), Utc::now()).unwrap();
        let ahead = Utc::now() + Duration::seconds(30);
        state
            .finish_trial(&trial.key, TrialResult::new(TrialStatus::Passed, ahead))
            .unwrap();

        assert!(state.try_finish(Utc::now()));
        assert_eq!(state.taskset().finished_at, Some(ahead));
    }

    #[test]
    fn test_reversed_enqueue_puts_task_in_front() {
        let mut state = state(&["spec/a_spec.rb", "spec/b_spec.rb"], 1);
        let first = state.dequeue().unwrap();

        assert!(state.reversed_enqueue(&first.key).unwrap());
        assert!(!state.reversed_enqueue(&first.key).unwrap(), "already queued");
        assert_eq!(state.dequeue().unwrap().key, first.key);
    }

    #[test]
    fn test_started_task_cannot_be_handed_out_again() {
        let mut state = state(&["spec/a_spec.rb"], 1);
        let task = state.dequeue().unwrap();
        state.start_trial(&task.key, &slave(), Utc::now()).unwrap();

        assert!(!state.reversed_enqueue(&task.key).unwrap());
        assert!(state.dequeue().is_none());
        assert!(matches!(
            state.start_trial(&task.key, &slave(), Utc::now()),
            Err(SchedulerError::TaskNotDequeued { .. })
        ));
        assert_eq!(state.running_trials(), 1);
        assert_eq!(state.task(&task.key).unwrap().trial_keys.len(), 1);
    }

    #[test]
    fn test_start_trial_requires_dequeue() {
        let mut state = state(&["spec/a_spec.rb", "spec/b_spec.rb"], 1);
        let queued = TaskKey::for_spec(state.key(), "spec/b_spec.rb");
        state.dequeue().unwrap();

        assert!(matches!(
            state.start_trial(&queued, &slave(), Utc::now()),
            Err(SchedulerError::TaskNotDequeued { .. })
        ));
        assert_eq!(state.queue_len(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let mut state = state(&["spec/a_spec.rb", "spec/b_spec.rb", "spec/c_spec.rb"], 1);
        run(&mut state, TrialStatus::Passed);
        run(&mut state, TrialStatus::Failed);
        let task = state.dequeue().unwrap();
        state.start_trial(&task.key, &slave(), Utc::now()).unwrap();

        let summary = state.summary();
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(summary.passed_tasks, 1);
        assert_eq!(summary.failed_tasks, 1);
        assert_eq!(summary.running_tasks, 1);
        assert_eq!(summary.queue_length, 0);
        assert_eq!(summary.running_trials, 1);
    }
}
