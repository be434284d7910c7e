use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use rrrspec_core::{
    models::{sanitize_for_filename, LogText, TasksetSnapshot},
    SchedulerResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Log,
    Stdout,
    Stderr,
}

impl LogKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            LogKind::Log => "log",
            LogKind::Stdout => "stdout",
            LogKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// `taskset:abc/1:2` + Log → `taskset_abc_1_2_log.log`
pub fn log_file_name(entity_key: &str, kind: LogKind) -> String {
    format!("{}_{}.log", sanitize_for_filename(entity_key), kind.suffix())
}

/// 把超过阈值的日志写入独立文件，记录中只保留路径
pub struct LogTextStore {
    root: PathBuf,
    threshold_bytes: usize,
}

impl LogTextStore {
    pub fn new(root: impl Into<PathBuf>, threshold_bytes: usize) -> Self {
        Self {
            root: root.into(),
            threshold_bytes,
        }
    }

    pub async fn externalize(
        &self,
        entity_key: &str,
        kind: LogKind,
        log: &LogText,
    ) -> SchedulerResult<LogText> {
        let Some(text) = log.text.as_deref() else {
            return Ok(log.clone());
        };
        if text.len() <= self.threshold_bytes {
            return Ok(log.clone());
        }

        let path = self.root.join(log_file_name(entity_key, kind));
        super::api_cache::write_atomically(&path, text.as_bytes()).await?;
        debug!(
            "日志外部化: {} ({} bytes) -> {}",
            entity_key,
            text.len(),
            path.display()
        );
        Ok(LogText::external(path.to_string_lossy().into_owned()))
    }

    /// 写完全部日志文件后才返回，失败时快照保持原样
    pub async fn externalize_snapshot(
        &self,
        snapshot: &TasksetSnapshot,
    ) -> SchedulerResult<TasksetSnapshot> {
        let mut externalized = snapshot.clone();

        let taskset = &mut externalized.taskset;
        taskset.log = self
            .externalize(taskset.key.as_str(), LogKind::Log, &taskset.log)
            .await?;

        for trial in &mut externalized.trials {
            trial.stdout = self
                .externalize(trial.key.as_str(), LogKind::Stdout, &trial.stdout)
                .await?;
            trial.stderr = self
                .externalize(trial.key.as_str(), LogKind::Stderr, &trial.stderr)
                .await?;
        }

        for slave in &mut externalized.slaves {
            slave.log = self
                .externalize(slave.key.as_str(), LogKind::Log, &slave.log)
                .await?;
        }

        for worker_log in &mut externalized.worker_logs {
            worker_log.log = self
                .externalize(worker_log.key.as_str(), LogKind::Log, &worker_log.log)
                .await?;
        }

        Ok(externalized)
    }

    /// 读出日志内容，内联或外部文件皆可
    pub async fn read(log: &LogText) -> SchedulerResult<Option<String>> {
        match (&log.text, &log.path) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            (None, None) => Ok(None),
        }
    }
}
