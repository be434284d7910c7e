//! # 持久化
//!
//! Taskset结束后把运行期状态转换为：
//!
//! - SQLite中的关系快照（`DurableStore::replace_snapshot`）
//! - 超过阈值的日志文件（`<log_root>/<sanitized key>_<kind>.log`）
//! - API缓存（`<cache_root>/v1/tasksets/<key>` 及其 `.gz`）
//! - 按 (taskset_class, spec_file) 统计的平均耗时
//!
//! 同一Taskset的持久化与缓存写入由按键的锁串行化。

pub mod api_cache;
pub mod log_text;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use rrrspec_core::{
    config::PersisterConfig,
    models::{TasksetKey, TasksetSnapshot},
    traits::{DurableStore, LiveStateStore},
    SchedulerError, SchedulerResult,
};

pub use api_cache::{cache_path, gz_path, gzip, render_full_json};
pub use log_text::{log_file_name, LogKind, LogTextStore};

pub struct Persister {
    live: Arc<dyn LiveStateStore>,
    durable: Arc<dyn DurableStore>,
    log_texts: LogTextStore,
    locks: Mutex<HashMap<TasksetKey, Arc<Mutex<()>>>>,
}

impl Persister {
    pub fn new(
        live: Arc<dyn LiveStateStore>,
        durable: Arc<dyn DurableStore>,
        config: &PersisterConfig,
    ) -> Self {
        Self {
            live,
            durable,
            log_texts: LogTextStore::new(
                &config.execute_log_text_path,
                config.log_externalize_threshold_bytes,
            ),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn key_lock(&self, key: &TasksetKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// 没有其他调用方等待时移除该键的锁
    async fn release_key_lock(&self, key: &TasksetKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // 映射和当前调用方各持有一份
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    /// 写入已结束Taskset的快照，可重复执行
    ///
    /// 先写日志文件再提交事务，任何I/O失败都会中止本次调用，
    /// 已有的快照保持不变。
    #[instrument(skip(self))]
    pub async fn persist(&self, key: &TasksetKey) -> SchedulerResult<TasksetSnapshot> {
        let lock = self.key_lock(key).await;
        let result = {
            let _guard = lock.lock().await;
            self.persist_locked(key).await
        };
        self.release_key_lock(key, lock).await;
        result
    }

    async fn persist_locked(&self, key: &TasksetKey) -> SchedulerResult<TasksetSnapshot> {
        let shared = self.live.taskset(key).await?;
        let snapshot = {
            let state = shared.lock().await;
            TasksetSnapshot::capture(&state)?
        };

        let snapshot = self.log_texts.externalize_snapshot(&snapshot).await?;
        self.durable.replace_snapshot(&snapshot).await?;

        info!(
            "Taskset已持久化: {} (tasks: {}, trials: {})",
            key,
            snapshot.tasks.len(),
            snapshot.trials.len()
        );
        Ok(snapshot)
    }

    /// 生成API缓存，返回未压缩文件的路径
    #[instrument(skip(self, output_dir))]
    pub async fn create_api_cache(
        &self,
        key: &TasksetKey,
        output_dir: &Path,
    ) -> SchedulerResult<PathBuf> {
        let lock = self.key_lock(key).await;
        let result = {
            let _guard = lock.lock().await;
            self.create_api_cache_locked(key, output_dir).await
        };
        self.release_key_lock(key, lock).await;
        result
    }

    async fn create_api_cache_locked(
        &self,
        key: &TasksetKey,
        output_dir: &Path,
    ) -> SchedulerResult<PathBuf> {
        let snapshot = self
            .durable
            .load_snapshot(key)
            .await?
            .ok_or_else(|| SchedulerError::SnapshotNotFound {
                key: key.to_string(),
            })?;

        let body = render_full_json(&snapshot)?;
        let compressed = gzip(&body)?;

        let path = cache_path(output_dir, key);
        api_cache::write_atomically(&path, &body).await?;
        api_cache::write_atomically(&gz_path(&path), &compressed).await?;

        debug!("API缓存已写入: {}", path.display());
        Ok(path)
    }

    /// 重新计算该Taskset所属class的平均耗时
    #[instrument(skip(self))]
    pub async fn update_estimate_sec(
        &self,
        key: &TasksetKey,
    ) -> SchedulerResult<BTreeMap<String, i64>> {
        let snapshot = self
            .durable
            .load_snapshot(key)
            .await?
            .ok_or_else(|| SchedulerError::SnapshotNotFound {
                key: key.to_string(),
            })?;
        let taskset_class = &snapshot.taskset.config.taskset_class;

        let estimations: BTreeMap<String, i64> = self
            .durable
            .trial_durations(taskset_class)
            .await?
            .into_iter()
            .filter(|(_, durations)| !durations.is_empty())
            .map(|(spec_file, durations)| {
                let mean = durations.iter().sum::<i64>() / durations.len() as i64;
                (spec_file, mean)
            })
            .collect();

        self.durable
            .save_estimations(taskset_class, &estimations)
            .await?;
        debug!(
            "更新平均耗时: {} ({} spec files)",
            taskset_class,
            estimations.len()
        );
        Ok(estimations)
    }

    /// 从运行期存储移除已持久化的Taskset
    pub async fn evict(&self, key: &TasksetKey) -> SchedulerResult<bool> {
        let removed = self.live.remove_taskset(key).await?;
        if removed {
            debug!("运行期状态已释放: {}", key);
        }
        Ok(removed)
    }

    pub async fn estimate_secs(&self, taskset_class: &str) -> SchedulerResult<BTreeMap<String, i64>> {
        self.durable.estimate_secs(taskset_class).await
    }
}
