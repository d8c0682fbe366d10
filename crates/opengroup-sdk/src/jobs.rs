//! 后台作业
//!
//! Poller 在拉到新消息后投递 TrimThread 作业（fire-and-forget），
//! 由独立的 TrimWorker 消费，限制本地历史无界增长。
//! 队列与消费者解耦，投递方从不等待执行结果。

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::error::{OpenGroupSDKError, Result};
use crate::storage::StorageGateway;

/// 后台作业类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// 裁剪指定会话的本地历史
    TrimThread { thread_id: i64 },
}

/// 作业调度器
///
/// 对 Poller 而言是可重入、线程安全的外部协作者，投递即返回。
#[async_trait::async_trait]
pub trait JobScheduler: Send + Sync {
    /// 投递一个作业，立即返回，不等待执行
    async fn enqueue(&self, job: Job) -> Result<()>;
}

/// 基于内存的作业队列实现
#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// 非阻塞取出下一个作业
    pub fn try_next(&self) -> Option<Job> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobScheduler for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        debug!("投递作业: {:?}", job);
        self.sender
            .send(job)
            .map_err(|e| OpenGroupSDKError::QueueClosed(format!("作业队列已关闭: {}", e)))
    }
}

/// 裁剪消费者配置
#[derive(Debug, Clone)]
pub struct TrimWorkerConfig {
    /// 每个会话保留的消息条数
    pub retain_count: usize,

    /// 队列轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for TrimWorkerConfig {
    fn default() -> Self {
        Self {
            retain_count: 2000,
            poll_interval_ms: 200,
        }
    }
}

/// 裁剪消费者统计
#[derive(Debug, Clone, Default)]
pub struct TrimWorkerStats {
    /// 处理的作业总数
    pub jobs_processed: u64,

    /// 累计裁掉的消息数
    pub messages_trimmed: u64,
}

/// 裁剪消费者
///
/// 后台任务循环消费 TrimThread 作业并调用存储网关执行裁剪。
pub struct TrimWorker {
    queue: MemoryJobQueue,
    storage: Arc<dyn StorageGateway>,
    config: TrimWorkerConfig,
    shutdown: Arc<Notify>,
    stats: Arc<RwLock<TrimWorkerStats>>,
}

impl TrimWorker {
    pub fn new(
        queue: MemoryJobQueue,
        storage: Arc<dyn StorageGateway>,
        config: TrimWorkerConfig,
    ) -> Self {
        Self {
            queue,
            storage,
            config,
            shutdown: Arc::new(Notify::new()),
            stats: Arc::new(RwLock::new(TrimWorkerStats::default())),
        }
    }

    /// 启动消费循环
    pub fn start(&self) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let storage = self.storage.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let stats = self.stats.clone();

        info!("TrimWorker 启动，retain_count={}", config.retain_count);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        info!("TrimWorker 退出");
                        break;
                    }
                    _ = sleep(Duration::from_millis(config.poll_interval_ms)) => {
                        while let Some(job) = queue.try_next() {
                            Self::process(&storage, &config, &stats, job).await;
                        }
                    }
                }
            }
        })
    }

    /// 通知消费循环退出
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    pub async fn stats(&self) -> TrimWorkerStats {
        self.stats.read().await.clone()
    }

    async fn process(
        storage: &Arc<dyn StorageGateway>,
        config: &TrimWorkerConfig,
        stats: &Arc<RwLock<TrimWorkerStats>>,
        job: Job,
    ) {
        match job {
            Job::TrimThread { thread_id } => {
                match storage.trim_thread(thread_id, config.retain_count).await {
                    Ok(trimmed) => {
                        if trimmed > 0 {
                            debug!("会话 {} 裁掉 {} 条消息", thread_id, trimmed);
                        }
                        let mut s = stats.write().await;
                        s.jobs_processed += 1;
                        s.messages_trimmed += trimmed as u64;
                    }
                    Err(e) => {
                        // 裁剪失败不影响后续作业，下次投递会再试
                        warn!("会话 {} 裁剪失败: {}", thread_id, e);
                        stats.write().await.jobs_processed += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_group::OpenGroup;
    use crate::storage::{KvStore, LocalStorage, SqliteStorage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn enqueue_then_try_next() {
        let queue = MemoryJobQueue::new();
        assert!(queue.is_empty());

        queue.enqueue(Job::TrimThread { thread_id: 3 }).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_next(), Some(Job::TrimThread { thread_id: 3 }));
        assert_eq!(queue.try_next(), None);
    }

    #[tokio::test]
    async fn trim_worker_drains_queue() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::open_with(
            SqliteStorage::open_in_memory().unwrap(),
            KvStore::open(temp_dir.path(), "cursors").unwrap(),
        ));

        let group = OpenGroup::new("server", "rust");
        let thread_id = storage.register_open_group(&group).await.unwrap();
        for i in 0..8i64 {
            storage
                .insert_message(thread_id, Some(i as u64 + 1), None, i, b"m", false)
                .await
                .unwrap();
        }

        let queue = MemoryJobQueue::new();
        let worker = TrimWorker::new(
            queue.clone(),
            storage.clone(),
            TrimWorkerConfig {
                retain_count: 3,
                poll_interval_ms: 10,
            },
        );
        let handle = worker.start();

        queue.enqueue(Job::TrimThread { thread_id }).await.unwrap();

        // 等消费循环跑几轮
        sleep(Duration::from_millis(100)).await;

        assert_eq!(storage.message_count(thread_id).await.unwrap(), 3);
        let stats = worker.stats().await;
        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(stats.messages_trimmed, 5);

        worker.stop();
        let _ = handle.await;
    }
}
