use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use rrrspec_core::{
    models::{
        Notification, RequeuePosition, SlaveKey, SlaveStatus, Task, TaskKey, TaskSpec, Taskset,
        TasksetConfig, TasksetKey, TasksetState, TasksetStatus, TasksetStatusSummary, Trial,
        TrialFinish, TrialKey, TrialResult,
    },
    traits::LiveStateStore,
    SchedulerResult,
};

use crate::notificator::Notificator;
use crate::strategies::RetryStrategy;

/// Trial结束对Task产生的效果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Passed,
    Retried { position: RequeuePosition },
    Exhausted,
    /// Taskset已结束，只做记录
    Stale,
    /// Task已经是终态
    Settled,
}

#[derive(Debug, Clone)]
pub struct TrialFinishReport {
    pub trial: Trial,
    pub outcome: FinishOutcome,
    /// 本次调用使Taskset进入finished
    pub taskset_finished: bool,
}

/// Taskset队列与重试状态机的服务入口
///
/// 出队、重试入队以及结束判定在同一Taskset锁内完成；通知在释放锁之后发送。
pub struct TaskQueueService {
    store: Arc<dyn LiveStateStore>,
    notificator: Arc<Notificator>,
    retry_strategy: Arc<dyn RetryStrategy>,
    completion_tx: Option<mpsc::UnboundedSender<TasksetKey>>,
}

impl TaskQueueService {
    pub fn new(
        store: Arc<dyn LiveStateStore>,
        notificator: Arc<Notificator>,
        retry_strategy: Arc<dyn RetryStrategy>,
    ) -> Self {
        Self {
            store,
            notificator,
            retry_strategy,
            completion_tx: None,
        }
    }

    /// 进入终态的Taskset键会发送到该通道
    pub fn with_completion_sink(mut self, tx: mpsc::UnboundedSender<TasksetKey>) -> Self {
        self.completion_tx = Some(tx);
        self
    }

    pub fn retry_strategy(&self) -> &dyn RetryStrategy {
        self.retry_strategy.as_ref()
    }

    #[instrument(skip(self, config, specs), fields(task_count = specs.len()))]
    pub async fn create_taskset(
        &self,
        config: TasksetConfig,
        specs: &[TaskSpec],
    ) -> SchedulerResult<Taskset> {
        let state = TasksetState::new(TasksetKey::generate(), config, specs, Utc::now())?;
        let taskset = state.taskset().clone();
        self.store.insert_taskset(state).await?;

        info!(
            "创建Taskset: {} (class: {}, tasks: {})",
            taskset.key,
            taskset.config.taskset_class,
            specs.len()
        );
        self.notificator
            .publish(Notification::TasksetCreated {
                taskset_key: taskset.key.clone(),
                task_count: specs.len(),
                occurred_at: taskset.created_at,
            })
            .await;
        Ok(taskset)
    }

    /// 返回None表示当前没有可执行的Task
    pub async fn dequeue_task(&self, taskset_key: &TasksetKey) -> SchedulerResult<Option<Task>> {
        let shared = self.store.taskset(taskset_key).await?;
        let task = {
            let mut state = shared.lock().await;
            state.dequeue()
        };

        if let Some(task) = &task {
            debug!("Task出队: {}", task.key);
            self.notificator
                .publish(Notification::TaskDequeued {
                    taskset_key: taskset_key.clone(),
                    task_key: task.key.clone(),
                    occurred_at: Utc::now(),
                })
                .await;
        }
        Ok(task)
    }

    pub async fn reversed_enqueue_task(&self, task_key: &TaskKey) -> SchedulerResult<bool> {
        let shared = self.store.owner_of(task_key.as_str()).await?;
        let enqueued = shared.lock().await.reversed_enqueue(task_key)?;
        if enqueued {
            debug!("Task重新放回队首: {}", task_key);
        }
        Ok(enqueued)
    }

    #[instrument(skip(self))]
    pub async fn create_trial(
        &self,
        task_key: &TaskKey,
        slave_key: &SlaveKey,
        started_at: DateTime<Utc>,
    ) -> SchedulerResult<Trial> {
        let shared = self.store.owner_of(task_key.as_str()).await?;
        let (taskset_key, trial) = {
            let mut state = shared.lock().await;
            let trial = state.start_trial(task_key, slave_key, started_at)?;
            match state.slave_mut(slave_key) {
                Ok(slave) => {
                    slave.current_trial = Some(trial.key.clone());
                    slave.status = SlaveStatus::Running;
                }
                Err(_) => warn!("Slave不属于该Taskset，跳过绑定: {}", slave_key),
            }
            (state.key().clone(), trial)
        };
        self.store
            .register_owner(trial.key.as_str(), &taskset_key)
            .await?;

        self.notificator
            .publish(Notification::TrialStarted {
                taskset_key,
                task_key: task_key.clone(),
                trial_key: trial.key.clone(),
                slave_key: slave_key.clone(),
                occurred_at: started_at,
            })
            .await;
        Ok(trial)
    }

    #[instrument(skip(self, result), fields(status = %result.status))]
    pub async fn finish_trial(
        &self,
        trial_key: &TrialKey,
        result: TrialResult,
    ) -> SchedulerResult<TrialFinishReport> {
        let shared = self.store.owner_of(trial_key.as_str()).await?;
        let (taskset_key, report) = {
            let mut state = shared.lock().await;
            let (trial, finish) = state.finish_trial(trial_key, result)?;

            let outcome = match finish {
                TrialFinish::Passed => FinishOutcome::Passed,
                TrialFinish::Retry { failed_attempts } => {
                    let position = self
                        .retry_strategy
                        .requeue_position(state.task(&trial.task_key)?, failed_attempts);
                    state.requeue(&trial.task_key, position)?;
                    FinishOutcome::Retried { position }
                }
                TrialFinish::Exhausted => FinishOutcome::Exhausted,
                TrialFinish::Stale => FinishOutcome::Stale,
                TrialFinish::Settled => FinishOutcome::Settled,
            };

            let taskset_finished = outcome != FinishOutcome::Stale && state.try_finish(Utc::now());
            (
                state.key().clone(),
                TrialFinishReport {
                    trial,
                    outcome,
                    taskset_finished,
                },
            )
        };

        match report.outcome {
            FinishOutcome::Stale => info!("Taskset已结束，Trial结果仅做记录: {}", trial_key),
            FinishOutcome::Exhausted => {
                info!("Task重试次数耗尽: {}", report.trial.task_key)
            }
            _ => debug!("Trial结束: {} -> {:?}", trial_key, report.outcome),
        }

        self.notificator
            .publish(Notification::TrialFinished {
                taskset_key: taskset_key.clone(),
                task_key: report.trial.task_key.clone(),
                trial_key: trial_key.clone(),
                status: report.trial.status,
                occurred_at: report.trial.finished_at.unwrap_or_else(Utc::now),
            })
            .await;
        if report.taskset_finished {
            self.on_closed(&taskset_key, TasksetStatus::Finished).await;
        }
        Ok(report)
    }

    /// 只有本次调用完成状态迁移时返回true
    pub async fn try_finish_taskset(&self, taskset_key: &TasksetKey) -> SchedulerResult<bool> {
        let shared = self.store.taskset(taskset_key).await?;
        let finished = shared.lock().await.try_finish(Utc::now());
        if finished {
            self.on_closed(taskset_key, TasksetStatus::Finished).await;
        }
        Ok(finished)
    }

    pub async fn fail_taskset(&self, taskset_key: &TasksetKey) -> SchedulerResult<bool> {
        let shared = self.store.taskset(taskset_key).await?;
        let failed = shared.lock().await.fail(Utc::now());
        if failed {
            self.on_closed(taskset_key, TasksetStatus::Failed).await;
        }
        Ok(failed)
    }

    pub async fn query_taskset_status(
        &self,
        taskset_key: &TasksetKey,
    ) -> SchedulerResult<TasksetStatusSummary> {
        let shared = self.store.taskset(taskset_key).await?;
        let summary = shared.lock().await.summary();
        Ok(summary)
    }

    async fn on_closed(&self, taskset_key: &TasksetKey, status: TasksetStatus) {
        info!("Taskset进入终态: {} ({})", taskset_key, status);
        let occurred_at = Utc::now();
        let notification = match status {
            TasksetStatus::Finished => Notification::TasksetFinished {
                taskset_key: taskset_key.clone(),
                status,
                occurred_at,
            },
            TasksetStatus::Failed => Notification::TasksetFailed {
                taskset_key: taskset_key.clone(),
                occurred_at,
            },
            TasksetStatus::Pending | TasksetStatus::Running => {
                warn!("Taskset状态不是终态，跳过通知: {} ({})", taskset_key, status);
                return;
            }
        };
        self.notificator.publish(notification).await;

        if let Some(tx) = &self.completion_tx {
            if tx.send(taskset_key.clone()).is_err() {
                warn!("持久化通道已关闭，跳过Taskset: {}", taskset_key);
            }
        }
    }
}
