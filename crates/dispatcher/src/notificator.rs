use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use rrrspec_core::models::{Notification, TasksetKey};

/// 一个监听连接的标识，可以同时订阅多个频道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Channel = HashMap<ListenerId, mpsc::Sender<Notification>>;

/// 生命周期事件分发
///
/// 一个全局频道加上每个Taskset各自的频道。投递是尽力而为的：
/// 队列已满的监听者丢失该事件，接收端已关闭的监听者被移除。
pub struct Notificator {
    buffer: usize,
    next_id: AtomicU64,
    global: RwLock<Channel>,
    tasksets: RwLock<HashMap<TasksetKey, Channel>>,
}

impl Notificator {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            global: RwLock::new(HashMap::new()),
            tasksets: RwLock::new(HashMap::new()),
        }
    }

    pub fn new_listener(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn listen_to_global(&self, listener: ListenerId) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.global.write().await.insert(listener, tx);
        debug!("{} 订阅全局频道", listener);
        rx
    }

    pub async fn listen_to_taskset(
        &self,
        listener: ListenerId,
        taskset: &TasksetKey,
    ) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.tasksets
            .write()
            .await
            .entry(taskset.clone())
            .or_default()
            .insert(listener, tx);
        debug!("{} 订阅Taskset频道: {}", listener, taskset);
        rx
    }

    /// 从所有频道移除监听者，可重复调用
    pub async fn close(&self, listener: ListenerId) {
        self.global.write().await.remove(&listener);
        let mut tasksets = self.tasksets.write().await;
        for channel in tasksets.values_mut() {
            channel.remove(&listener);
        }
        tasksets.retain(|_, channel| !channel.is_empty());
        debug!("{} 已关闭", listener);
    }

    /// 同时订阅了全局频道和Taskset频道的监听者只收到一份
    pub async fn publish(&self, notification: Notification) {
        let mut reached = HashSet::new();
        if notification.is_global() {
            let closed = deliver(&*self.global.read().await, &notification, &mut reached);
            if !closed.is_empty() {
                let mut global = self.global.write().await;
                for listener in closed {
                    global.remove(&listener);
                }
            }
        }

        let taskset = notification.taskset_key().clone();
        let closed = match self.tasksets.read().await.get(&taskset) {
            Some(channel) => deliver(channel, &notification, &mut reached),
            None => Vec::new(),
        };
        if !closed.is_empty() {
            let mut tasksets = self.tasksets.write().await;
            if let Some(channel) = tasksets.get_mut(&taskset) {
                for listener in closed {
                    channel.remove(&listener);
                }
                if channel.is_empty() {
                    tasksets.remove(&taskset);
                }
            }
        }
    }

    pub async fn global_listener_count(&self) -> usize {
        self.global.read().await.len()
    }

    pub async fn taskset_listener_count(&self, taskset: &TasksetKey) -> usize {
        self.tasksets
            .read()
            .await
            .get(taskset)
            .map(|channel| channel.len())
            .unwrap_or(0)
    }
}

/// 跳过 `reached` 中的监听者，返回接收端已关闭的监听者
fn deliver(
    channel: &Channel,
    notification: &Notification,
    reached: &mut HashSet<ListenerId>,
) -> Vec<ListenerId> {
    let mut closed = Vec::new();
    for (listener, tx) in channel {
        if !reached.insert(*listener) {
            continue;
        }
        match tx.try_send(notification.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "{} 事件队列已满，丢弃事件: {}",
                    listener,
                    notification.event_type()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*listener),
        }
    }
    closed
}
