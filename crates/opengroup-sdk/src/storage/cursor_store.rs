//! 房间游标存储
//!
//! 键格式：`last_message_server_id:{server}:{room}` 与
//! `last_deletion_server_id:{server}:{room}`，消息游标与删除游标分开记录。

use super::kv::KvStore;
use crate::error::Result;

const MESSAGE_PREFIX: &str = "last_message_server_id";
const DELETION_PREFIX: &str = "last_deletion_server_id";

/// 存储 (server, room) 的消息/删除游标
#[derive(Debug, Clone)]
pub struct RoomCursorStore {
    kv: KvStore,
}

impl RoomCursorStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    fn message_key(room: &str, server: &str) -> String {
        format!("{}:{}:{}", MESSAGE_PREFIX, server, room)
    }

    fn deletion_key(room: &str, server: &str) -> String {
        format!("{}:{}:{}", DELETION_PREFIX, server, room)
    }

    pub fn last_message_server_id(&self, room: &str, server: &str) -> Result<Option<u64>> {
        self.kv.get(Self::message_key(room, server).as_str())
    }

    pub fn set_last_message_server_id(&self, room: &str, server: &str, value: u64) -> Result<()> {
        self.kv.set(Self::message_key(room, server).as_str(), &value)
    }

    pub fn last_deletion_server_id(&self, room: &str, server: &str) -> Result<Option<u64>> {
        self.kv.get(Self::deletion_key(room, server).as_str())
    }

    pub fn set_last_deletion_server_id(&self, room: &str, server: &str, value: u64) -> Result<()> {
        self.kv.set(Self::deletion_key(room, server).as_str(), &value)
    }

    /// 离开房间时清掉两个游标
    pub fn clear(&self, room: &str, server: &str) -> Result<()> {
        self.kv.remove(Self::message_key(room, server).as_str())?;
        self.kv.remove(Self::deletion_key(room, server).as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cursor_key_format() {
        assert_eq!(
            RoomCursorStore::message_key("rust", "https://open.example.org"),
            "last_message_server_id:https://open.example.org:rust"
        );
        assert_eq!(
            RoomCursorStore::deletion_key("rust", "https://open.example.org"),
            "last_deletion_server_id:https://open.example.org:rust"
        );
    }

    #[test]
    fn cursors_are_stored_independently() {
        let temp_dir = TempDir::new().unwrap();
        let store = RoomCursorStore::new(KvStore::open(temp_dir.path(), "cursors").unwrap());

        store
            .set_last_message_server_id("rust", "server", 12)
            .unwrap();
        store
            .set_last_deletion_server_id("rust", "server", 3)
            .unwrap();

        assert_eq!(
            store.last_message_server_id("rust", "server").unwrap(),
            Some(12)
        );
        assert_eq!(
            store.last_deletion_server_id("rust", "server").unwrap(),
            Some(3)
        );
        // 不同房间互不影响
        assert_eq!(store.last_message_server_id("go", "server").unwrap(), None);

        store.clear("rust", "server").unwrap();
        assert_eq!(store.last_message_server_id("rust", "server").unwrap(), None);
    }
}
