use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use rrrspec_core::{models::TasksetKey, SchedulerResult};

use crate::persister::Persister;

/// 一次运行中处理过的Taskset
#[derive(Debug, Default, Clone)]
pub struct PersistenceReport {
    pub persisted: Vec<TasksetKey>,
    pub failed: Vec<(TasksetKey, String)>,
}

/// 消费结束Taskset的通道，依次执行持久化、缓存生成和耗时统计
pub struct PersistenceService {
    persister: Arc<Persister>,
    json_cache_path: PathBuf,
}

impl PersistenceService {
    pub fn new(persister: Arc<Persister>, json_cache_path: impl Into<PathBuf>) -> Self {
        Self {
            persister,
            json_cache_path: json_cache_path.into(),
        }
    }

    /// 持久化失败直接返回，运行期状态保留；缓存和耗时统计失败只记录日志
    pub async fn process(&self, key: &TasksetKey) -> SchedulerResult<()> {
        self.persister.persist(key).await?;

        match self
            .persister
            .create_api_cache(key, &self.json_cache_path)
            .await
        {
            Ok(path) => info!("API缓存已生成: {}", path.display()),
            Err(e) => error!("生成API缓存失败 {}: {}", key, e),
        }

        if let Err(e) = self.persister.update_estimate_sec(key).await {
            warn!("更新平均耗时失败 {}: {}", key, e);
        }

        self.persister.evict(key).await?;
        Ok(())
    }

    async fn handle(&self, key: TasksetKey, report: &mut PersistenceReport) {
        match self.process(&key).await {
            Ok(()) => report.persisted.push(key),
            Err(e) => {
                error!("持久化Taskset失败 {}: {}", key, e);
                report.failed.push((key, e.to_string()));
            }
        }
    }

    pub async fn run(
        &self,
        mut rx: mpsc::UnboundedReceiver<TasksetKey>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> PersistenceReport {
        let mut report = PersistenceReport::default();
        info!("持久化服务启动");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    rx.close();
                    let mut drained = 0;
                    while let Ok(key) = rx.try_recv() {
                        self.handle(key, &mut report).await;
                        drained += 1;
                    }
                    info!("收到关闭信号，持久化服务停止 (drained: {})", drained);
                    break;
                }
                received = rx.recv() => {
                    let Some(key) = received else {
                        info!("完成通道已关闭，持久化服务停止");
                        break;
                    };
                    self.handle(key, &mut report).await;
                }
            }
        }

        report
    }
}
