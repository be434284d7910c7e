use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::models::{TasksetKey, TasksetSnapshot};
use crate::SchedulerResult;

/// 持久化存储接口
///
/// 只接收已结束Taskset的快照。写入以Taskset为单位整体替换，
/// 同一快照重复写入不会产生重复记录。
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 在一个事务内替换该Taskset的全部记录
    async fn replace_snapshot(&self, snapshot: &TasksetSnapshot) -> SchedulerResult<()>;

    async fn load_snapshot(&self, key: &TasksetKey) -> SchedulerResult<Option<TasksetSnapshot>>;

    /// 历史上通过的Trial耗时（秒），按spec_file分组
    async fn trial_durations(&self, taskset_class: &str)
        -> SchedulerResult<BTreeMap<String, Vec<i64>>>;

    async fn save_estimations(
        &self,
        taskset_class: &str,
        estimations: &BTreeMap<String, i64>,
    ) -> SchedulerResult<()>;

    /// spec_file → 平均耗时（秒）
    async fn estimate_secs(&self, taskset_class: &str) -> SchedulerResult<BTreeMap<String, i64>>;
}
