use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use rrrspec_core::{
    models::{
        LogText, PersistedSlave, PersistedTask, PersistedTaskset, PersistedTrial,
        PersistedWorkerLog, TasksetConfig, TasksetKey, TasksetSnapshot,
    },
    traits::DurableStore,
    SchedulerResult,
};

pub struct SqliteDurableStore {
    pool: SqlitePool,
}

impl SqliteDurableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn log_text(row: &SqliteRow, column: &str) -> SchedulerResult<LogText> {
        Ok(LogText {
            text: row.try_get(column)?,
            path: row.try_get(format!("{column}_path").as_str())?,
        })
    }

    fn row_to_taskset(row: &SqliteRow) -> SchedulerResult<PersistedTaskset> {
        Ok(PersistedTaskset {
            key: TasksetKey::from(row.try_get::<String, _>("taskset_key")?),
            config: TasksetConfig {
                rsync_name: row.try_get("rsync_name")?,
                setup_command: row.try_get("setup_command")?,
                slave_command: row.try_get("slave_command")?,
                worker_type: row.try_get("worker_type")?,
                taskset_class: row.try_get("taskset_class")?,
                max_workers: row.try_get("max_workers")?,
                max_trials: row.try_get("max_trials")?,
            },
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            finished_at: row.try_get("finished_at")?,
            log: Self::log_text(row, "log")?,
        })
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<PersistedTask> {
        Ok(PersistedTask {
            key: row.try_get::<String, _>("task_key")?.into(),
            taskset_key: row.try_get::<String, _>("taskset_key")?.into(),
            spec_file: row.try_get("spec_file")?,
            status: row.try_get("status")?,
            estimate_sec: row.try_get("estimate_sec")?,
        })
    }

    fn row_to_trial(row: &SqliteRow) -> SchedulerResult<PersistedTrial> {
        Ok(PersistedTrial {
            key: row.try_get::<String, _>("trial_key")?.into(),
            task_key: row.try_get::<String, _>("task_key")?.into(),
            slave_key: row.try_get::<String, _>("slave_key")?.into(),
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            stdout: Self::log_text(row, "stdout")?,
            stderr: Self::log_text(row, "stderr")?,
            passed_count: row.try_get("passed_count")?,
            pending_count: row.try_get("pending_count")?,
            failed_count: row.try_get("failed_count")?,
        })
    }

    fn row_to_slave(row: &SqliteRow) -> SchedulerResult<PersistedSlave> {
        Ok(PersistedSlave {
            key: row.try_get::<String, _>("slave_key")?.into(),
            worker_key: row.try_get::<String, _>("worker_key")?.into(),
            status: row.try_get("status")?,
            log: Self::log_text(row, "log")?,
        })
    }

    fn row_to_worker_log(row: &SqliteRow) -> SchedulerResult<PersistedWorkerLog> {
        Ok(PersistedWorkerLog {
            key: row.try_get::<String, _>("worker_log_key")?.into(),
            worker_key: row.try_get::<String, _>("worker_key")?.into(),
            rsync_finished_at: row.try_get("rsync_finished_at")?,
            setup_finished_at: row.try_get("setup_finished_at")?,
            worker_finished_at: row.try_get("worker_finished_at")?,
            finished: row.try_get("finished")?,
            log: Self::log_text(row, "log")?,
        })
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    #[instrument(skip(self, snapshot), fields(
        taskset_key = %snapshot.taskset.key,
        tasks = snapshot.tasks.len(),
        trials = snapshot.trials.len(),
    ))]
    async fn replace_snapshot(&self, snapshot: &TasksetSnapshot) -> SchedulerResult<()> {
        let key = snapshot.taskset.key.as_str();
        let mut tx = self.pool.begin().await?;

        for table in ["tasksets", "tasks", "trials", "slaves", "worker_logs"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE taskset_key = ?"))
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        let taskset = &snapshot.taskset;
        sqlx::query(
            r#"
            INSERT INTO tasksets (taskset_key, rsync_name, setup_command, slave_command,
                                  worker_type, taskset_class, max_workers, max_trials,
                                  status, created_at, finished_at, log, log_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(&taskset.config.rsync_name)
        .bind(&taskset.config.setup_command)
        .bind(&taskset.config.slave_command)
        .bind(&taskset.config.worker_type)
        .bind(&taskset.config.taskset_class)
        .bind(taskset.config.max_workers)
        .bind(taskset.config.max_trials)
        .bind(taskset.status)
        .bind(taskset.created_at)
        .bind(taskset.finished_at)
        .bind(&taskset.log.text)
        .bind(&taskset.log.path)
        .execute(&mut *tx)
        .await?;

        for (position, task) in snapshot.tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO tasks (task_key, taskset_key, position, spec_file, status, estimate_sec)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(task.key.as_str())
            .bind(key)
            .bind(position as i64)
            .bind(&task.spec_file)
            .bind(task.status)
            .bind(task.estimate_sec)
            .execute(&mut *tx)
            .await?;
        }

        for (position, trial) in snapshot.trials.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO trials (trial_key, taskset_key, task_key, slave_key, position, status,
                                    started_at, finished_at, stdout, stdout_path, stderr,
                                    stderr_path, passed_count, pending_count, failed_count)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(trial.key.as_str())
            .bind(key)
            .bind(trial.task_key.as_str())
            .bind(trial.slave_key.as_str())
            .bind(position as i64)
            .bind(trial.status)
            .bind(trial.started_at)
            .bind(trial.finished_at)
            .bind(&trial.stdout.text)
            .bind(&trial.stdout.path)
            .bind(&trial.stderr.text)
            .bind(&trial.stderr.path)
            .bind(trial.passed_count)
            .bind(trial.pending_count)
            .bind(trial.failed_count)
            .execute(&mut *tx)
            .await?;
        }

        for (position, slave) in snapshot.slaves.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO slaves (slave_key, taskset_key, worker_key, position, status, log, log_path)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(slave.key.as_str())
            .bind(key)
            .bind(slave.worker_key.as_str())
            .bind(position as i64)
            .bind(slave.status)
            .bind(&slave.log.text)
            .bind(&slave.log.path)
            .execute(&mut *tx)
            .await?;
        }

        for (position, worker_log) in snapshot.worker_logs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO worker_logs (worker_log_key, taskset_key, worker_key, position,
                                         rsync_finished_at, setup_finished_at, worker_finished_at,
                                         finished, log, log_path)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(worker_log.key.as_str())
            .bind(key)
            .bind(worker_log.worker_key.as_str())
            .bind(position as i64)
            .bind(worker_log.rsync_finished_at)
            .bind(worker_log.setup_finished_at)
            .bind(worker_log.worker_finished_at)
            .bind(worker_log.finished)
            .bind(&worker_log.log.text)
            .bind(&worker_log.log.path)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("快照写入完成: {}", key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_snapshot(&self, key: &TasksetKey) -> SchedulerResult<Option<TasksetSnapshot>> {
        let Some(row) = sqlx::query("SELECT * FROM tasksets WHERE taskset_key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let taskset = Self::row_to_taskset(&row)?;

        let tasks = sqlx::query("SELECT * FROM tasks WHERE taskset_key = ? ORDER BY position")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::row_to_task)
            .collect::<SchedulerResult<Vec<_>>>()?;

        let trials = sqlx::query("SELECT * FROM trials WHERE taskset_key = ? ORDER BY position")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::row_to_trial)
            .collect::<SchedulerResult<Vec<_>>>()?;

        let slaves = sqlx::query("SELECT * FROM slaves WHERE taskset_key = ? ORDER BY position")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::row_to_slave)
            .collect::<SchedulerResult<Vec<_>>>()?;

        let worker_logs =
            sqlx::query("SELECT * FROM worker_logs WHERE taskset_key = ? ORDER BY position")
                .bind(key.as_str())
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(Self::row_to_worker_log)
                .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(Some(TasksetSnapshot {
            taskset,
            tasks,
            trials,
            slaves,
            worker_logs,
        }))
    }

    #[instrument(skip(self))]
    async fn trial_durations(
        &self,
        taskset_class: &str,
    ) -> SchedulerResult<BTreeMap<String, Vec<i64>>> {
        let rows = sqlx::query(
            r#"
            SELECT tasks.spec_file, trials.started_at, trials.finished_at
            FROM trials
            JOIN tasks ON tasks.task_key = trials.task_key
            JOIN tasksets ON tasksets.taskset_key = trials.taskset_key
            WHERE tasksets.taskset_class = ?
              AND trials.status = 'passed'
              AND trials.finished_at IS NOT NULL
            "#,
        )
        .bind(taskset_class)
        .fetch_all(&self.pool)
        .await?;

        let mut durations: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for row in &rows {
            let spec_file: String = row.try_get("spec_file")?;
            let started_at: DateTime<Utc> = row.try_get("started_at")?;
            let finished_at: DateTime<Utc> = row.try_get("finished_at")?;
            durations
                .entry(spec_file)
                .or_default()
                .push((finished_at - started_at).num_seconds());
        }
        Ok(durations)
    }

    #[instrument(skip(self, estimations), fields(count = estimations.len()))]
    async fn save_estimations(
        &self,
        taskset_class: &str,
        estimations: &BTreeMap<String, i64>,
    ) -> SchedulerResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (spec_file, estimate_sec) in estimations {
            sqlx::query(
                r#"
                INSERT INTO task_estimations (taskset_class, spec_file, estimate_sec, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (taskset_class, spec_file)
                DO UPDATE SET estimate_sec = excluded.estimate_sec, updated_at = excluded.updated_at
                "#,
            )
            .bind(taskset_class)
            .bind(spec_file)
            .bind(*estimate_sec)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn estimate_secs(&self, taskset_class: &str) -> SchedulerResult<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT spec_file, estimate_sec FROM task_estimations WHERE taskset_class = ?",
        )
        .bind(taskset_class)
        .fetch_all(&self.pool)
        .await?;

        let mut estimations = BTreeMap::new();
        for row in &rows {
            estimations.insert(
                row.try_get::<String, _>("spec_file")?,
                row.try_get::<i64, _>("estimate_sec")?,
            );
        }
        Ok(estimations)
    }
}
