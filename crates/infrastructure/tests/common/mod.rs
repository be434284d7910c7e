#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rrrspec_core::config::{DatabaseConfig, PersisterConfig};
use rrrspec_core::models::{SlaveKey, TaskSpec, TasksetConfig, TasksetKey, TrialResult, TrialStatus};
use rrrspec_core::traits::{DurableStore, LiveStateStore};
use rrrspec_dispatcher::{FrontOfQueueStrategy, Notificator, TaskQueueService, WorkerRegistry};
use rrrspec_infrastructure::{DatabaseManager, InMemoryLiveStore, Persister};
use tempfile::TempDir;

/// 真实存储组成的一套测试环境，临时目录随结构体一起释放
pub struct TestEnv {
    pub dir: TempDir,
    pub database: DatabaseManager,
    pub live: Arc<InMemoryLiveStore>,
    pub durable: Arc<dyn DurableStore>,
    pub queue: TaskQueueService,
    pub registry: WorkerRegistry,
    pub persister: Arc<Persister>,
    log_dir: PathBuf,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_threshold(64 * 1024).await
    }

    pub async fn with_threshold(log_externalize_threshold_bytes: usize) -> Self {
        Self::with_log_dir(log_externalize_threshold_bytes, "log_text").await
    }

    /// 日志目录为临时目录下的 `log_dir_name`
    pub async fn with_log_dir(log_externalize_threshold_bytes: usize, log_dir_name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join(log_dir_name);
        let database = DatabaseManager::new(&DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("rrrspec.db").display()),
            max_connections: 2,
            min_connections: 1,
            connection_timeout_seconds: 5,
            idle_timeout_seconds: 60,
        })
        .await
        .unwrap();
        database.migrate().await.unwrap();

        let live = Arc::new(InMemoryLiveStore::new());
        let durable: Arc<dyn DurableStore> = Arc::new(database.durable_store());
        let store: Arc<dyn LiveStateStore> = live.clone();

        let queue = TaskQueueService::new(
            Arc::clone(&store),
            Arc::new(Notificator::new(64)),
            Arc::new(FrontOfQueueStrategy::new()),
        );
        let registry = WorkerRegistry::new(Arc::clone(&store));
        let persister = Arc::new(Persister::new(
            store,
            Arc::clone(&durable),
            &PersisterConfig {
                execute_log_text_path: log_dir.display().to_string(),
                json_cache_path: dir.path().join("json_cache").display().to_string(),
                log_externalize_threshold_bytes,
            },
        ));

        Self {
            dir,
            database,
            live,
            durable,
            queue,
            registry,
            persister,
            log_dir,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("json_cache")
    }

    pub async fn count_rows(&self, table: &str, key: &TasksetKey) -> i64 {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE taskset_key = ?"
        ))
        .bind(key.as_str())
        .fetch_one(self.database.pool())
        .await
        .unwrap()
    }

    /// 依次执行每个Task，每个Trial耗时 `duration_sec` 秒并通过
    pub async fn run_passing(
        &self,
        key: &TasksetKey,
        slave: &SlaveKey,
        started_at: DateTime<Utc>,
        duration_sec: i64,
    ) {
        while let Some(task) = self.queue.dequeue_task(key).await.unwrap() {
            let trial = self
                .queue
                .create_trial(&task.key, slave, started_at)
                .await
                .unwrap();
            self.queue
                .finish_trial(
                    &trial.key,
                    TrialResult::new(
                        TrialStatus::Passed,
                        started_at + Duration::seconds(duration_sec),
                    )
                    .with_output("1 example, 0 failures", "")
                    .with_counts(1, 0, 0),
                )
                .await
                .unwrap();
        }
    }
}

pub fn taskset_config(taskset_class: &str) -> TasksetConfig {
    TasksetConfig {
        rsync_name: "app".to_string(),
        setup_command: "bundle install".to_string(),
        slave_command: "bundle exec rspec".to_string(),
        worker_type: "default".to_string(),
        taskset_class: taskset_class.to_string(),
        max_workers: 2,
        max_trials: 2,
    }
}

pub fn specs(files: &[&str]) -> Vec<TaskSpec> {
    files.iter().map(|file| TaskSpec::new(*file)).collect()
}

pub fn slave() -> SlaveKey {
    SlaveKey::from("rrrspec:worker:w1:slave:s1")
}
