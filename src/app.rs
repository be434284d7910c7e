use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info};

use rrrspec_core::{
    config::ServerConfig,
    models::{TaskSpec, Taskset, TasksetConfig, TasksetKey},
    traits::{DurableStore, LiveStateStore},
    SchedulerResult,
};
use rrrspec_dispatcher::{
    retry_strategy_from_name, ListenerId, Notificator, TaskQueueService, WorkerRegistry,
};
use rrrspec_infrastructure::{
    DatabaseManager, InMemoryLiveStore, PersistenceReport, PersistenceService, Persister,
};

/// 主应用程序
pub struct Application {
    config: ServerConfig,
    database: DatabaseManager,
    notificator: Arc<Notificator>,
    queue: Arc<TaskQueueService>,
    registry: Arc<WorkerRegistry>,
    persister: Arc<Persister>,
    persistence: PersistenceService,
    completion_rx: Mutex<Option<mpsc::UnboundedReceiver<TasksetKey>>>,
}

impl Application {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("初始化数据库表失败")?;

        let live: Arc<dyn LiveStateStore> = Arc::new(InMemoryLiveStore::new());
        let durable: Arc<dyn DurableStore> = Arc::new(database.durable_store());

        let notificator = Arc::new(Notificator::new(config.dispatcher.notification_buffer));
        let retry_strategy = retry_strategy_from_name(&config.dispatcher.retry_ordering)?;
        info!("重试策略: {}", retry_strategy.name());

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(
            TaskQueueService::new(
                Arc::clone(&live),
                Arc::clone(&notificator),
                retry_strategy,
            )
            .with_completion_sink(completion_tx),
        );
        let registry = Arc::new(WorkerRegistry::new(Arc::clone(&live)));

        let persister = Arc::new(Persister::new(live, durable, &config.persister));
        let persistence =
            PersistenceService::new(Arc::clone(&persister), &config.persister.json_cache_path);

        Ok(Self {
            config,
            database,
            notificator,
            queue,
            registry,
            persister,
            persistence,
            completion_rx: Mutex::new(Some(completion_rx)),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TaskQueueService> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn notificator(&self) -> &Arc<Notificator> {
        &self.notificator
    }

    pub fn persister(&self) -> &Arc<Persister> {
        &self.persister
    }

    /// 创建Taskset；未给出estimate_sec的Task用历史平均耗时补齐
    pub async fn create_taskset(
        &self,
        config: TasksetConfig,
        specs: &[TaskSpec],
    ) -> SchedulerResult<Taskset> {
        let estimations = self.persister.estimate_secs(&config.taskset_class).await?;
        let specs: Vec<TaskSpec> = specs
            .iter()
            .map(|spec| match (spec.estimate_sec, estimations.get(&spec.spec_file)) {
                (None, Some(&estimate)) => spec.clone().with_estimate(estimate),
                _ => spec.clone(),
            })
            .collect();
        debug!(
            "历史耗时命中 {}/{} 个spec",
            specs.iter().filter(|s| s.estimate_sec.is_some()).count(),
            specs.len()
        );
        self.queue.create_taskset(config, &specs).await
    }

    /// 注销监听者，关闭其所有事件通道
    pub async fn close(&self, listener: ListenerId) {
        self.notificator.close(listener).await;
    }

    /// 运行持久化服务直到收到关闭信号，只能调用一次
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<PersistenceReport> {
        let completion_rx = self
            .completion_rx
            .lock()
            .await
            .take()
            .context("应用程序已经在运行")?;

        info!("启动应用程序");
        let report = self.persistence.run(completion_rx, shutdown_rx).await;
        info!(
            "持久化服务已停止 (persisted: {}, failed: {})",
            report.persisted.len(),
            report.failed.len()
        );

        self.database.close().await;
        Ok(report)
    }
}
