//! 本地存储网关 - SQLite + sled 组合实现
//!
//! 会话与消息走 SQLite，游标走 sled KV。rusqlite 连接不是 Sync 的，
//! 用 tokio Mutex 串行化访问；游标读写本身极轻，不经过该锁。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::cursor_store::RoomCursorStore;
use super::kv::KvStore;
use super::sqlite::SqliteStorage;
use super::{LocalMessageRef, StorageGateway};
use crate::error::Result;
use crate::open_group::OpenGroup;

const CURSOR_TREE: &str = "open_group_cursors";

/// SDK 自带的存储网关实现
pub struct LocalStorage {
    sqlite: Arc<Mutex<SqliteStorage>>,
    cursors: RoomCursorStore,
}

impl LocalStorage {
    /// 在 base_path 下打开数据库（`messages.db` 与 `kv/`）
    pub fn open(base_path: &Path) -> Result<Self> {
        let sqlite = SqliteStorage::open(&base_path.join("messages.db"))?;
        let kv = KvStore::open(base_path, CURSOR_TREE)?;
        Ok(Self {
            sqlite: Arc::new(Mutex::new(sqlite)),
            cursors: RoomCursorStore::new(kv),
        })
    }

    /// 测试用：内存 SQLite + 临时目录 KV
    pub fn open_with(sqlite: SqliteStorage, kv: KvStore) -> Self {
        Self {
            sqlite: Arc::new(Mutex::new(sqlite)),
            cursors: RoomCursorStore::new(kv),
        }
    }

    /// 注册开放群组会话，返回 thread ID
    pub async fn register_open_group(&self, group: &OpenGroup) -> Result<i64> {
        self.sqlite.lock().await.register_open_group(group)
    }

    /// 写入一条消息（接收管道落库入口）
    pub async fn insert_message(
        &self,
        thread_id: i64,
        server_id: Option<u64>,
        sender: Option<&str>,
        timestamp: i64,
        body: &[u8],
        is_short: bool,
    ) -> Result<i64> {
        self.sqlite
            .lock()
            .await
            .insert_message(thread_id, server_id, sender, timestamp, body, is_short)
    }

    /// 会话内消息数
    pub async fn message_count(&self, thread_id: i64) -> Result<usize> {
        self.sqlite.lock().await.message_count(thread_id)
    }
}

#[async_trait::async_trait]
impl StorageGateway for LocalStorage {
    async fn rooms(&self, server: &str) -> Result<Vec<String>> {
        self.sqlite.lock().await.rooms_for_server(server)
    }

    async fn thread_id(&self, address: &str) -> Result<Option<i64>> {
        self.sqlite.lock().await.thread_id_by_address(address)
    }

    async fn last_message_server_id(&self, room: &str, server: &str) -> Result<Option<u64>> {
        self.cursors.last_message_server_id(room, server)
    }

    async fn set_last_message_server_id(&self, room: &str, server: &str, value: u64) -> Result<()> {
        self.cursors.set_last_message_server_id(room, server, value)
    }

    async fn last_deletion_server_id(&self, room: &str, server: &str) -> Result<Option<u64>> {
        self.cursors.last_deletion_server_id(room, server)
    }

    async fn set_last_deletion_server_id(
        &self,
        room: &str,
        server: &str,
        value: u64,
    ) -> Result<()> {
        self.cursors.set_last_deletion_server_id(room, server, value)
    }

    async fn resolve_local_message(
        &self,
        deleted_message_server_id: u64,
        thread_id: i64,
    ) -> Result<Option<LocalMessageRef>> {
        self.sqlite
            .lock()
            .await
            .resolve_by_server_id(deleted_message_server_id, thread_id)
    }

    async fn delete_message(&self, message: LocalMessageRef) -> Result<()> {
        self.sqlite.lock().await.delete_message(message.message_id)
    }

    async fn trim_thread(&self, thread_id: i64, retain: usize) -> Result<usize> {
        self.sqlite.lock().await.trim_thread(thread_id, retain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn gateway_combines_sqlite_and_cursors() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::open_with(
            SqliteStorage::open_in_memory().unwrap(),
            KvStore::open(temp_dir.path(), CURSOR_TREE).unwrap(),
        );

        let group = OpenGroup::new("server", "rust");
        let thread_id = storage.register_open_group(&group).await.unwrap();

        assert_eq!(
            storage.thread_id(&group.address()).await.unwrap(),
            Some(thread_id)
        );
        assert_eq!(storage.rooms("server").await.unwrap(), vec!["rust"]);

        storage
            .set_last_message_server_id("rust", "server", 5)
            .await
            .unwrap();
        assert_eq!(
            storage.last_message_server_id("rust", "server").await.unwrap(),
            Some(5)
        );

        let row = storage
            .insert_message(thread_id, Some(5), Some("05abc"), 100, b"hi", false)
            .await
            .unwrap();
        let resolved = storage
            .resolve_local_message(5, thread_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.message_id, row);

        storage.delete_message(resolved).await.unwrap();
        assert!(storage
            .resolve_local_message(5, thread_id)
            .await
            .unwrap()
            .is_none());
    }
}
