use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info};

use rrrspec_core::{config::DatabaseConfig, SchedulerResult};

use super::sqlite::SqliteDurableStore;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasksets (
        taskset_key TEXT PRIMARY KEY,
        rsync_name TEXT NOT NULL,
        setup_command TEXT NOT NULL,
        slave_command TEXT NOT NULL,
        worker_type TEXT NOT NULL,
        taskset_class TEXT NOT NULL,
        max_workers INTEGER NOT NULL,
        max_trials INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        finished_at TEXT,
        log TEXT,
        log_path TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        task_key TEXT PRIMARY KEY,
        taskset_key TEXT NOT NULL,
        position INTEGER NOT NULL,
        spec_file TEXT NOT NULL,
        status TEXT NOT NULL,
        estimate_sec INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_taskset_key ON tasks (taskset_key)",
    r#"
    CREATE TABLE IF NOT EXISTS trials (
        trial_key TEXT PRIMARY KEY,
        taskset_key TEXT NOT NULL,
        task_key TEXT NOT NULL,
        slave_key TEXT NOT NULL,
        position INTEGER NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        stdout TEXT,
        stdout_path TEXT,
        stderr TEXT,
        stderr_path TEXT,
        passed_count INTEGER,
        pending_count INTEGER,
        failed_count INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_trials_taskset_key ON trials (taskset_key)",
    r#"
    CREATE TABLE IF NOT EXISTS slaves (
        slave_key TEXT PRIMARY KEY,
        taskset_key TEXT NOT NULL,
        worker_key TEXT NOT NULL,
        position INTEGER NOT NULL,
        status TEXT NOT NULL,
        log TEXT,
        log_path TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_slaves_taskset_key ON slaves (taskset_key)",
    r#"
    CREATE TABLE IF NOT EXISTS worker_logs (
        worker_log_key TEXT PRIMARY KEY,
        taskset_key TEXT NOT NULL,
        worker_key TEXT NOT NULL,
        position INTEGER NOT NULL,
        rsync_finished_at TEXT,
        setup_finished_at TEXT,
        worker_finished_at TEXT,
        finished INTEGER NOT NULL,
        log TEXT,
        log_path TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_worker_logs_taskset_key ON worker_logs (taskset_key)",
    r#"
    CREATE TABLE IF NOT EXISTS task_estimations (
        taskset_class TEXT NOT NULL,
        spec_file TEXT NOT NULL,
        estimate_sec INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (taskset_class, spec_file)
    )
    "#,
];

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await?;

        info!("SQLite连接池已建立: {}", config.url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 建表，可重复执行
    pub async fn migrate(&self) -> SchedulerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("数据库表结构已就绪");
        Ok(())
    }

    pub fn durable_store(&self) -> SqliteDurableStore {
        SqliteDurableStore::new(self.pool.clone())
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
