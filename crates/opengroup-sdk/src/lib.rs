//! OpenGroup SDK - 开放群组轮询与增量同步
//!
//! 本 SDK 实现开放群组（open group）客户端的后台同步核心，包括：
//! - 🔁 固定间隔的轮询调度（成功失败都前向推进）
//! - 📡 compact_poll 增量拉取：一次往返带回多个房间的新消息与删除
//! - 📬 按 server_id 全序投递给消息接收管道，单条失败不中断批次
//! - 🧮 每房间双游标（消息 / 删除）单调推进，崩溃后 at-least-once 重放
//! - 🗑️ 删除记录解析到本地消息并清理，未入库目标静默跳过
//! - 🧹 非空批次投递会话裁剪作业，限制本地历史增长
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use opengroup_sdk::{
//!     CompactPollBody, CompactPollClient, LocalStorage, MemoryJobQueue, NoopPipeline,
//!     OpenGroup, OpenGroupPoller, Result,
//! };
//!
//! /// 实际部署时由 HTTP 传输层实现 compact_poll
//! struct HttpClient;
//!
//! #[async_trait::async_trait]
//! impl CompactPollClient for HttpClient {
//!     async fn compact_poll(
//!         &self,
//!         _rooms: &[String],
//!         _server: &str,
//!     ) -> Result<HashMap<String, CompactPollBody>> {
//!         Ok(HashMap::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let storage = Arc::new(LocalStorage::open(Path::new("/path/to/data"))?);
//!     let group = OpenGroup::new("https://open.example.org", "rust");
//!     storage.register_open_group(&group).await?;
//!
//!     let poller = OpenGroupPoller::new(
//!         group.server.clone(),
//!         storage,
//!         Arc::new(NoopPipeline),
//!         Arc::new(MemoryJobQueue::new()),
//!         Arc::new(HttpClient),
//!     );
//!     poller.start_if_needed().await;
//!
//!     // ...
//!     poller.stop().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod api;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod open_group;
pub mod poller;
pub mod storage;

// 重新导出核心类型，方便使用
pub use api::CompactPollClient;
pub use error::{OpenGroupSDKError, Result};
pub use ingest::{
    Envelope, EnvelopeType, IngestError, MessageIngestionPipeline, NoopPipeline,
    GROUP_MESSAGE_SOURCE_DEVICE,
};
pub use jobs::{Job, JobScheduler, MemoryJobQueue, TrimWorker, TrimWorkerConfig, TrimWorkerStats};
pub use open_group::{CompactPollBody, MessageDeletion, OpenGroup, OpenGroupMessage};
pub use poller::{
    IngestFailure, OpenGroupPoller, PollReport, PollerConfig, MAX_INACTIVITY_PERIOD, POLL_INTERVAL,
};
pub use storage::{
    KvStore, LocalMessageRef, LocalStorage, RoomCursorStore, SqliteStorage, StorageGateway,
};
