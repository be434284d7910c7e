mod common;

use std::sync::Arc;

use chrono::Utc;
use rrrspec_core::models::{SlaveStatus, TasksetKey, TrialResult, TrialStatus, WorkerKey};
use rrrspec_core::traits::LiveStateStore;
use rrrspec_core::SchedulerError;
use rrrspec_dispatcher::{FrontOfQueueStrategy, Notificator, TaskQueueService, WorkerRegistry};

use common::{specs, taskset_config, MockLiveStateStore};

struct Fixture {
    store: Arc<MockLiveStateStore>,
    queue: TaskQueueService,
    registry: WorkerRegistry,
}

fn fixture() -> Fixture {
    let store = MockLiveStateStore::shared();
    let queue = TaskQueueService::new(
        store.clone(),
        Arc::new(Notificator::new(16)),
        Arc::new(FrontOfQueueStrategy::new()),
    );
    let registry = WorkerRegistry::new(store.clone());
    Fixture {
        store,
        queue,
        registry,
    }
}

#[tokio::test]
async fn test_current_taskset_binds_and_unbinds() {
    let f = fixture();
    let taskset = f.queue.create_taskset(taskset_config(1), &specs(1)).await.unwrap();
    let worker_key = WorkerKey::from_name("worker-1");

    let worker = f
        .registry
        .current_taskset(&worker_key, Some(&taskset.key))
        .await
        .unwrap();
    assert_eq!(worker.current_taskset, Some(taskset.key.clone()));

    let worker = f.registry.current_taskset(&worker_key, None).await.unwrap();
    assert!(worker.current_taskset.is_none());

    let missing = TasksetKey::generate();
    assert!(matches!(
        f.registry.current_taskset(&worker_key, Some(&missing)).await,
        Err(SchedulerError::TasksetNotFound { .. })
    ));
}

#[tokio::test]
async fn test_slave_and_worker_log_require_bound_worker() {
    let f = fixture();
    f.queue.create_taskset(taskset_config(1), &specs(1)).await.unwrap();
    let worker_key = WorkerKey::from_name("worker-2");

    assert!(matches!(
        f.registry.create_slave(&worker_key, "slave-1").await,
        Err(SchedulerError::WorkerNotFound { .. })
    ));

    f.registry.current_taskset(&worker_key, None).await.unwrap();
    assert!(matches!(
        f.registry.create_worker_log(&worker_key).await,
        Err(SchedulerError::WorkerNotBound { .. })
    ));
}

#[tokio::test]
async fn test_worker_lifecycle_is_recorded_in_taskset_state() {
    let f = fixture();
    let taskset = f.queue.create_taskset(taskset_config(1), &specs(1)).await.unwrap();
    let worker_key = WorkerKey::from_name("worker-3");
    f.registry
        .current_taskset(&worker_key, Some(&taskset.key))
        .await
        .unwrap();

    let worker_log = f.registry.create_worker_log(&worker_key).await.unwrap();
    f.registry
        .append_worker_log_log(&worker_log.key, "rsync done\n")
        .await
        .unwrap();
    let rsync_at = Utc::now();
    f.registry
        .set_rsync_finished_time(&worker_log.key, rsync_at)
        .await
        .unwrap();
    f.registry
        .set_setup_finished_time(&worker_log.key, Utc::now())
        .await
        .unwrap();
    f.registry
        .set_worker_finished_time(&worker_log.key, Utc::now())
        .await
        .unwrap();
    f.registry.finish_worker_log(&worker_log.key).await.unwrap();

    let slave = f.registry.create_slave(&worker_key, "slave-1").await.unwrap();
    f.registry.append_slave_log(&slave.key, "booted\n").await.unwrap();

    let task = f.queue.dequeue_task(&taskset.key).await.unwrap().unwrap();
    let trial = f
        .queue
        .create_trial(&task.key, &slave.key, Utc::now())
        .await
        .unwrap();
    f.registry
        .current_trial(&slave.key, Some(&trial.key))
        .await
        .unwrap();
    f.queue
        .finish_trial(&trial.key, TrialResult::new(TrialStatus::Passed, Utc::now()))
        .await
        .unwrap();
    f.registry.current_trial(&slave.key, None).await.unwrap();
    f.registry.finish_slave(&slave.key).await.unwrap();
    f.registry
        .append_taskset_log(&taskset.key, "all done\n")
        .await
        .unwrap();

    let shared = f.store.taskset(&taskset.key).await.unwrap();
    let state = shared.lock().await;
    assert_eq!(state.taskset().log, "all done\n");

    let recorded_log = &state.worker_logs()[0];
    assert_eq!(recorded_log.log, "rsync done\n");
    assert_eq!(recorded_log.rsync_finished_at, Some(rsync_at));
    assert!(recorded_log.setup_finished_at.is_some());
    assert!(recorded_log.worker_finished_at.is_some());
    assert!(recorded_log.finished);

    let recorded_slave = &state.slaves()[0];
    assert_eq!(recorded_slave.log, "booted\n");
    assert_eq!(recorded_slave.status, SlaveStatus::Finished);
    assert!(recorded_slave.current_trial.is_none());
}

#[tokio::test]
async fn test_create_trial_binds_slave() {
    let f = fixture();
    let taskset = f.queue.create_taskset(taskset_config(1), &specs(1)).await.unwrap();
    let worker_key = WorkerKey::from_name("worker-4");
    f.registry
        .current_taskset(&worker_key, Some(&taskset.key))
        .await
        .unwrap();
    let slave = f.registry.create_slave(&worker_key, "slave-1").await.unwrap();

    let task = f.queue.dequeue_task(&taskset.key).await.unwrap().unwrap();
    let trial = f
        .queue
        .create_trial(&task.key, &slave.key, Utc::now())
        .await
        .unwrap();

    let shared = f.store.taskset(&taskset.key).await.unwrap();
    let state = shared.lock().await;
    assert_eq!(state.slaves()[0].current_trial, Some(trial.key));
    assert_eq!(state.slaves()[0].status, SlaveStatus::Running);
}
