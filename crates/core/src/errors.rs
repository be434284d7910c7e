use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("文件读写错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("Taskset未找到: {key}")]
    TasksetNotFound { key: String },

    #[error("Task未找到: {key}")]
    TaskNotFound { key: String },

    #[error("Trial未找到: {key}")]
    TrialNotFound { key: String },

    #[error("Worker未找到: {key}")]
    WorkerNotFound { key: String },

    #[error("Slave未找到: {key}")]
    SlaveNotFound { key: String },

    #[error("WorkerLog未找到: {key}")]
    WorkerLogNotFound { key: String },

    #[error("Worker未绑定Taskset: {key}")]
    WorkerNotBound { key: String },

    #[error("Task未出队或已开始执行: {key}")]
    TaskNotDequeued { key: String },

    #[error("Trial已经结束: {key}")]
    TrialAlreadyFinished { key: String },

    #[error("Taskset尚未结束，无法持久化: {key}")]
    TasksetNotClosed { key: String },

    #[error("持久化快照不存在: {key}")]
    SnapshotNotFound { key: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn taskset_not_found(key: impl ToString) -> Self {
        Self::TasksetNotFound {
            key: key.to_string(),
        }
    }

    pub fn task_not_found(key: impl ToString) -> Self {
        Self::TaskNotFound {
            key: key.to_string(),
        }
    }

    pub fn trial_not_found(key: impl ToString) -> Self {
        Self::TrialNotFound {
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
