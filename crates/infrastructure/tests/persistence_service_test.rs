mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rrrspec_core::models::{TasksetKey, TrialResult, TrialStatus};
use rrrspec_core::traits::LiveStateStore;
use rrrspec_dispatcher::{BackOfQueueStrategy, Notificator, TaskQueueService};
use rrrspec_infrastructure::persister::cache_path;
use rrrspec_infrastructure::PersistenceService;
use tokio::sync::{broadcast, mpsc};

use common::{slave, specs, taskset_config, TestEnv};

#[tokio::test]
async fn test_completed_tasksets_are_persisted_in_order() {
    let env = TestEnv::new().await;
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let store: Arc<dyn LiveStateStore> = env.live.clone();
    let queue = TaskQueueService::new(
        store,
        Arc::new(Notificator::new(16)),
        Arc::new(BackOfQueueStrategy::new()),
    )
    .with_completion_sink(completion_tx);

    let mut keys = Vec::new();
    for _ in 0..2 {
        let taskset = queue
            .create_taskset(taskset_config("app-master"), &specs(&["spec/a_spec.rb"]))
            .await
            .unwrap();
        let task = queue.dequeue_task(&taskset.key).await.unwrap().unwrap();
        let started_at = Utc::now() - Duration::seconds(20);
        let trial = queue.create_trial(&task.key, &slave(), started_at).await.unwrap();
        let report = queue
            .finish_trial(
                &trial.key,
                TrialResult::new(TrialStatus::Passed, started_at + Duration::seconds(8)),
            )
            .await
            .unwrap();
        assert!(report.taskset_finished);
        keys.push(taskset.key);
    }
    drop(queue);

    let service = PersistenceService::new(Arc::clone(&env.persister), env.cache_dir());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let report = service.run(completion_rx, shutdown_rx).await;

    assert_eq!(report.persisted, keys);
    assert!(report.failed.is_empty());
    for key in &keys {
        assert!(env.durable.load_snapshot(key).await.unwrap().is_some());
        assert!(cache_path(&env.cache_dir(), key).exists());
    }
    assert_eq!(
        env.persister.estimate_secs("app-master").await.unwrap()["spec/a_spec.rb"],
        8
    );
    assert!(env.live.is_empty().await);
}

#[tokio::test]
async fn test_failures_are_reported_and_do_not_stop_the_loop() {
    let env = TestEnv::new().await;
    let taskset = env
        .queue
        .create_taskset(taskset_config("app-master"), &specs(&["spec/a_spec.rb"]))
        .await
        .unwrap();
    env.run_passing(&taskset.key, &slave(), Utc::now() - Duration::seconds(5), 1)
        .await;

    let unknown = TasksetKey::generate();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(unknown.clone()).unwrap();
    tx.send(taskset.key.clone()).unwrap();
    drop(tx);

    let service = PersistenceService::new(Arc::clone(&env.persister), env.cache_dir());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let report = service.run(rx, shutdown_rx).await;

    assert_eq!(report.persisted, vec![taskset.key]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, unknown);
}

#[tokio::test]
async fn test_failed_persist_keeps_live_state() {
    let env = TestEnv::new().await;
    let taskset = env
        .queue
        .create_taskset(taskset_config("app-master"), &specs(&["spec/a_spec.rb"]))
        .await
        .unwrap();

    let service = PersistenceService::new(Arc::clone(&env.persister), env.cache_dir());
    assert!(service.process(&taskset.key).await.is_err());
    assert_eq!(env.live.len().await, 1);

    env.run_passing(&taskset.key, &slave(), Utc::now() - Duration::seconds(5), 1)
        .await;
    service.process(&taskset.key).await.unwrap();
    assert!(env.live.is_empty().await);
    assert!(env.durable.load_snapshot(&taskset.key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let env = TestEnv::new().await;
    let service = PersistenceService::new(Arc::clone(&env.persister), env.cache_dir());
    let (_tx, rx) = mpsc::unbounded_channel::<TasksetKey>();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { service.run(rx, shutdown_rx).await });
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    shutdown_tx.send(()).unwrap();

    let report = tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(report.persisted.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_buffered_keys_are_persisted_on_shutdown() {
    let env = TestEnv::new().await;
    let mut keys = Vec::new();
    for _ in 0..3 {
        let taskset = env
            .queue
            .create_taskset(taskset_config("app-master"), &specs(&["spec/a_spec.rb"]))
            .await
            .unwrap();
        env.run_passing(&taskset.key, &slave(), Utc::now() - Duration::seconds(5), 2)
            .await;
        keys.push(taskset.key);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    for key in &keys {
        tx.send(key.clone()).unwrap();
    }
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();

    let service = PersistenceService::new(Arc::clone(&env.persister), env.cache_dir());
    let report = tokio::time::timeout(StdDuration::from_secs(5), service.run(rx, shutdown_rx))
        .await
        .unwrap();

    assert_eq!(report.persisted, keys);
    assert!(report.failed.is_empty());
    for key in &keys {
        assert!(env.durable.load_snapshot(key).await.unwrap().is_some());
    }
    assert!(env.live.is_empty().await);
    assert!(tx.send(TasksetKey::generate()).is_err());
}
