//! # 数据模型
//!
//! 定义rrrspec调度服务的核心数据结构：Taskset、Task、Trial，以及
//! 执行测试的Worker、Slave和WorkerLog。
//!
//! ## 核心模型
//!
//! ### Taskset - 一次测试运行
//! 创建时一次性提交全部spec文件，每个spec对应一个Task，之后不再追加。
//!
//! ### Task - 单个spec文件
//! 状态完全由Trial历史和重试预算推导，不直接修改。
//!
//! ### Trial - 一次执行尝试
//! Slave开始执行Task时创建，结束时间只写入一次，之后不再删除。
//!
//! ### Worker / Slave / WorkerLog
//! Worker同一时刻只绑定一个Taskset；Slave和WorkerLog记录归属Taskset的状态，
//! 与Taskset共享同一把锁。
//!
//! ## 键格式
//!
//! ```text
//! rrrspec:taskset:<uuid>
//! rrrspec:taskset:<uuid>:task:<spec_file>
//! rrrspec:taskset:<uuid>:task:<spec_file>:trial:<uuid>
//! rrrspec:worker:<name>
//! rrrspec:worker:<name>:slave:<slave name>:<uuid>
//! rrrspec:worker:<name>:worker_log:<uuid>
//! ```
//!
//! ## 数据库映射
//!
//! 运行期状态只保存在内存中（`TasksetState`）；Taskset结束后由Persister
//! 转换为 `TasksetSnapshot` 写入以下表：
//!
//! - `tasksets` / `tasks` / `trials` / `slaves` / `worker_logs`
//! - `task_estimations` - 按 (taskset_class, spec_file) 统计的平均耗时

pub mod keys;
pub mod notification;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod task;
pub mod taskset;
pub mod trial;
pub mod worker;

pub use keys::{
    sanitize_for_cache, sanitize_for_filename, SlaveKey, TaskKey, TasksetKey, TrialKey, WorkerKey,
    WorkerLogKey,
};
pub use notification::Notification;
pub use snapshot::{
    LogText, PersistedSlave, PersistedTask, PersistedTaskset, PersistedTrial, PersistedWorkerLog,
    TasksetSnapshot,
};
pub use state::{RequeuePosition, TasksetState, TasksetStatusSummary, TrialFinish};
pub use status::{SlaveStatus, TaskStatus, TasksetStatus, TrialStatus};
pub use task::Task;
pub use taskset::{validate_task_specs, TaskSpec, Taskset, TasksetConfig};
pub use trial::{Trial, TrialResult};
pub use worker::{Slave, Worker, WorkerLog};
