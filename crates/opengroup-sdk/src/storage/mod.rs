//! 存储网关
//!
//! 功能包括：
//! - 房间与本地会话（thread）的存在性查询
//! - 每房间的消息游标 / 删除游标持久化
//! - 删除记录到本地消息的解析与删除
//! - 会话裁剪
//!
//! 游标由 sled KV 承载（见 `cursor_store`），会话与消息由 SQLite 承载（见 `sqlite`）。
//! `LocalStorage` 把两者组合成完整的 `StorageGateway` 实现。

pub mod cursor_store;
pub mod gateway;
pub mod kv;
pub mod sqlite;

pub use cursor_store::RoomCursorStore;
pub use gateway::LocalStorage;
pub use kv::KvStore;
pub use sqlite::SqliteStorage;

use crate::error::Result;

/// 本地消息标识：行 ID + 是否属于短消息存储子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMessageRef {
    /// 本地消息行 ID
    pub message_id: i64,

    /// 是否短消息（短消息与富媒体消息分表存储的历史遗留）
    pub is_short: bool,
}

/// 存储网关
///
/// 持久化记录的唯一写入方。同一房间的游标只会被它的 Poller 串行读写，
/// 不同服务器的 Poller 并发访问各自房间，需要实现方保证读-改-写安全。
#[async_trait::async_trait]
pub trait StorageGateway: Send + Sync {
    /// 本服务器上已加入的全部房间名
    async fn rooms(&self, server: &str) -> Result<Vec<String>>;

    /// 按会话地址查本地 thread ID，不存在返回 None
    async fn thread_id(&self, address: &str) -> Result<Option<i64>>;

    /// 消息游标：该房间已处理的最大 server_id
    async fn last_message_server_id(&self, room: &str, server: &str) -> Result<Option<u64>>;

    async fn set_last_message_server_id(&self, room: &str, server: &str, value: u64) -> Result<()>;

    /// 删除游标：该房间已处理的最大删除事件 ID
    async fn last_deletion_server_id(&self, room: &str, server: &str) -> Result<Option<u64>>;

    async fn set_last_deletion_server_id(&self, room: &str, server: &str, value: u64)
        -> Result<()>;

    /// 按 (被删消息的 server_id, thread_id) 解析本地消息，未入库的返回 None
    async fn resolve_local_message(
        &self,
        deleted_message_server_id: u64,
        thread_id: i64,
    ) -> Result<Option<LocalMessageRef>>;

    /// 删除一条本地消息
    async fn delete_message(&self, message: LocalMessageRef) -> Result<()>;

    /// 裁剪会话，仅保留最新的 retain 条消息
    async fn trim_thread(&self, thread_id: i64, retain: usize) -> Result<usize>;
}
