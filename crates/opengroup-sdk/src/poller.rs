//! 开放群组轮询器 - 核心调度与增量同步
//!
//! 每个远端服务器一个 Poller 实例，周期性执行：
//! 拉取本服务器全部房间的 compact_poll 增量 → 逐房间先应用新消息、再应用删除
//! → 推进游标 → 固定间隔后重排下一轮（成功失败都重排，保证前向推进）。
//!
//! ## NOTE: Poller 不做退避
//!
//! 轮询失败不在本轮重试，也没有指数退避，固定间隔重排已经给陈旧度兜底。
//! 游标只在确认收到批次后推进，失败的消息仍在游标之上，下一轮会重新拉到。

use std::cmp::max;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::api::CompactPollClient;
use crate::error::Result;
use crate::ingest::{Envelope, IngestError, MessageIngestionPipeline};
use crate::jobs::{Job, JobScheduler};
use crate::open_group::{MessageDeletion, OpenGroup, OpenGroupMessage};
use crate::storage::StorageGateway;

/// 两次轮询之间的固定间隔
pub const POLL_INTERVAL: Duration = Duration::from_secs(4);

/// 房间无活动的最长保留期（毫秒），供上层的房间清理策略使用
pub const MAX_INACTIVITY_PERIOD: i64 = 14 * 24 * 60 * 60 * 1000;

/// 轮询器配置
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// 单条消息的接收失败记录
#[derive(Debug, Clone)]
pub struct IngestFailure {
    /// 房间名
    pub room: String,

    /// 失败消息的 server_id
    pub server_id: Option<u64>,

    /// 失败原因
    pub error: IngestError,
}

/// 一轮轮询的结果汇总
///
/// 单条消息的解析失败不会中断批次，全部收进 `ingest_failures` 供观测。
#[derive(Debug, Default)]
pub struct PollReport {
    /// 实际处理的房间数（有本地会话的）
    pub rooms_polled: usize,

    /// 成功交给接收管道的消息数
    pub messages_ingested: usize,

    /// 实际删除的本地消息数
    pub deletions_applied: usize,

    /// 本轮全部单条接收失败
    pub ingest_failures: Vec<IngestFailure>,
}

/// 轮询器内部状态
#[derive(Debug, Default)]
struct PollerState {
    /// 调度循环是否在运行
    has_started: bool,

    /// 是否已完成至少一轮无积压的同步
    is_caught_up: bool,

    /// 倒数第二个接收作业的引用，外部接收作业簿记负责维护；
    /// 为 None 且尚未 caught-up 时标记追平
    second_to_last_job: Option<String>,
}

struct PollerInner {
    server: String,
    storage: Arc<dyn StorageGateway>,
    pipeline: Arc<dyn MessageIngestionPipeline>,
    jobs: Arc<dyn JobScheduler>,
    client: Arc<dyn CompactPollClient>,
    config: PollerConfig,
    state: RwLock<PollerState>,
    /// 取消挂起的定时器；只打断还没进入执行的那一轮
    cancel_timer: Notify,
}

/// 开放群组轮询器
///
/// 协作者全部通过构造函数显式注入，Poller 自身只独占调度状态；
/// 游标与会话记录经存储网关读写。克隆得到的是同一实例的句柄。
#[derive(Clone)]
pub struct OpenGroupPoller {
    inner: Arc<PollerInner>,
}

impl OpenGroupPoller {
    pub fn new(
        server: impl Into<String>,
        storage: Arc<dyn StorageGateway>,
        pipeline: Arc<dyn MessageIngestionPipeline>,
        jobs: Arc<dyn JobScheduler>,
        client: Arc<dyn CompactPollClient>,
    ) -> Self {
        Self::with_config(
            server,
            storage,
            pipeline,
            jobs,
            client,
            PollerConfig::default(),
        )
    }

    pub fn with_config(
        server: impl Into<String>,
        storage: Arc<dyn StorageGateway>,
        pipeline: Arc<dyn MessageIngestionPipeline>,
        jobs: Arc<dyn JobScheduler>,
        client: Arc<dyn CompactPollClient>,
        config: PollerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                server: server.into(),
                storage,
                pipeline,
                jobs,
                client,
                config,
                state: RwLock::new(PollerState::default()),
                cancel_timer: Notify::new(),
            }),
        }
    }

    pub fn server(&self) -> &str {
        &self.inner.server
    }

    pub async fn has_started(&self) -> bool {
        self.inner.state.read().await.has_started
    }

    pub async fn is_caught_up(&self) -> bool {
        self.inner.state.read().await.is_caught_up
    }

    /// 外部接收作业簿记更新倒数第二个作业引用
    pub async fn set_second_to_last_job(&self, job_id: Option<String>) {
        self.inner.state.write().await.second_to_last_job = job_id;
    }

    /// 启动调度循环；已在运行时是 no-op，防止同一服务器出现重复循环
    pub async fn start_if_needed(&self) {
        {
            let mut state = self.inner.state.write().await;
            if state.has_started {
                return;
            }
            state.has_started = true;
        }
        info!("开放群组轮询启动: server={}", self.inner.server);
        self.schedule(Duration::ZERO);
    }

    /// 停止调度：取消挂起的下一轮，正在执行的一轮照常跑完，
    /// 其收尾的重排会在调度前复查运行标记而被抑制
    pub async fn stop(&self) {
        self.inner.state.write().await.has_started = false;
        // notify_waiters 只唤醒当前等在定时器上的任务，不会留下许可
        self.inner.cancel_timer.notify_waiters();
        info!("开放群组轮询停止: server={}", self.inner.server);
    }

    /// 排一轮延迟 delay 的轮询
    fn schedule(&self, delay: Duration) {
        let poller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = poller.inner.cancel_timer.notified() => {
                    debug!("挂起的轮询被取消: server={}", poller.inner.server);
                    return;
                }
                _ = sleep(delay) => {}
            }
            if !poller.inner.state.read().await.has_started {
                return;
            }
            poller.run_cycle().await;
        });
    }

    /// 执行一轮并重排下一轮；失败与否都按固定间隔重排
    async fn run_cycle(&self) {
        match self.poll(false).await {
            Ok(report) => {
                if !report.ingest_failures.is_empty() {
                    warn!(
                        "本轮有 {} 条消息接收失败: server={}",
                        report.ingest_failures.len(),
                        self.inner.server
                    );
                }
            }
            Err(e) => {
                warn!("轮询失败，下轮重试: server={}, error={}", self.inner.server, e);
            }
        }
        // stop() 之后不再重排
        if self.inner.state.read().await.has_started {
            self.schedule(self.inner.config.poll_interval);
        } else {
            debug!("轮询已停止，不再重排: server={}", self.inner.server);
        }
    }

    /// 执行一轮轮询：一次 compact_poll 拉全部房间，逐房间应用增量
    ///
    /// 没有本地会话的房间整轮跳过；同一房间内先消息后删除，
    /// 保证删除不会先于它指向的消息被处理。
    pub async fn poll(&self, is_background_poll: bool) -> Result<PollReport> {
        let inner = &self.inner;
        let rooms = inner.storage.rooms(&inner.server).await?;
        let responses = inner.client.compact_poll(&rooms, &inner.server).await?;

        let mut report = PollReport::default();
        for (room, body) in responses {
            let group = OpenGroup::new(inner.server.clone(), room.clone());
            let thread_id = match inner.storage.thread_id(&group.address()).await? {
                Some(id) => id,
                None => {
                    debug!("房间没有本地会话，跳过: room={}", room);
                    continue;
                }
            };

            report.rooms_polled += 1;
            let (ingested, failures) = self
                .handle_new_messages(&room, thread_id, body.messages, is_background_poll)
                .await?;
            report.messages_ingested += ingested;
            report.ingest_failures.extend(failures);

            report.deletions_applied += self
                .handle_deleted_messages(&room, thread_id, body.deletions)
                .await?;

            let mut state = inner.state.write().await;
            if state.second_to_last_job.is_none() && !state.is_caught_up {
                state.is_caught_up = true;
                info!("开放群组轮询追平: server={}", inner.server);
            }
        }
        Ok(report)
    }

    /// 应用一个房间的新消息
    ///
    /// 按 server_id 升序逐条投递（server_id 才是房间内的权威全序，
    /// 客户端时间戳可能偏斜或重复）；单条失败只记录不中断。
    async fn handle_new_messages(
        &self,
        room: &str,
        thread_id: i64,
        mut messages: Vec<OpenGroupMessage>,
        is_background_poll: bool,
    ) -> Result<(usize, Vec<IngestFailure>)> {
        let inner = &self.inner;
        messages.sort_by_key(|m| m.server_id.unwrap_or(0));

        let mut ingested = 0usize;
        let mut failures = Vec::new();
        for message in &messages {
            let result = match &message.sender {
                Some(sender) => {
                    let envelope = Envelope::group_message(
                        sender.clone(),
                        message.sent_timestamp,
                        message.payload.clone(),
                        message.server_id,
                    );
                    inner.pipeline.ingest(envelope).await
                }
                None => Err(IngestError::MissingSender),
            };
            match result {
                Ok(()) => ingested += 1,
                Err(e) => {
                    warn!(
                        "消息接收失败: room={}, server_id={:?}, background={}, error={}",
                        room, message.server_id, is_background_poll, e
                    );
                    failures.push(IngestFailure {
                        room: room.to_string(),
                        server_id: message.server_id,
                        error: e,
                    });
                }
            }
        }

        // 游标推进与单条接收成败无关：消息一经观察到就不会再被拉取，
        // 管道侧按 发送者+时间戳+内容 去重兜住重复投递
        let current = inner
            .storage
            .last_message_server_id(room, &inner.server)
            .await?
            .unwrap_or(0);
        let batch_max = messages.iter().filter_map(|m| m.server_id).max().unwrap_or(0);
        let actual_max = max(batch_max, current);
        if actual_max > 0 {
            inner
                .storage
                .set_last_message_server_id(room, &inner.server, actual_max)
                .await?;
        }

        if !messages.is_empty() {
            // fire-and-forget，投递失败不影响本轮
            if let Err(e) = inner.jobs.enqueue(Job::TrimThread { thread_id }).await {
                warn!("投递裁剪作业失败: thread_id={}, error={}", thread_id, e);
            }
        }

        Ok((ingested, failures))
    }

    /// 应用一个房间的删除记录
    ///
    /// 未入库的删除目标静默跳过；删除游标只在本批最大 ID 非零
    /// 且大于当前值时写入，避免把合法游标覆盖成零。
    async fn handle_deleted_messages(
        &self,
        room: &str,
        thread_id: i64,
        deletions: Vec<MessageDeletion>,
    ) -> Result<usize> {
        let inner = &self.inner;
        let mut applied = 0usize;
        for deletion in &deletions {
            match inner
                .storage
                .resolve_local_message(deletion.deleted_message_server_id, thread_id)
                .await?
            {
                Some(local) => {
                    inner.storage.delete_message(local).await?;
                    applied += 1;
                }
                None => {
                    debug!(
                        "删除目标未入库，跳过: room={}, server_id={}",
                        room, deletion.deleted_message_server_id
                    );
                }
            }
        }

        let current = inner
            .storage
            .last_deletion_server_id(room, &inner.server)
            .await?
            .unwrap_or(0);
        let latest = deletions.iter().map(|d| d.id).max().unwrap_or(0);
        if latest > current && latest != 0 {
            inner
                .storage
                .set_last_deletion_server_id(room, &inner.server, latest)
                .await?;
        }

        Ok(applied)
    }
}
