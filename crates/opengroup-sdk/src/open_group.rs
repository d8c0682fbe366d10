//! 开放群组数据模型
//!
//! 与服务端 compact_poll 协议对齐：一次轮询返回每个房间的新消息与删除记录。
//! 消息排序键是服务端分配的 server_id（不是时间戳，客户端时间不可信）。

use serde::{Deserialize, Serialize};

/// 开放群组标识：server + room 唯一定位一个远端群聊房间
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenGroup {
    /// 服务器地址
    pub server: String,

    /// 房间名
    pub room: String,
}

impl OpenGroup {
    pub fn new(server: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            room: room.into(),
        }
    }

    /// 规范化的开放群组 ID，格式 `{server}.{room}`，同时作为本地会话的地址键
    pub fn address(&self) -> String {
        format!("{}.{}", self.server, self.room)
    }
}

/// 服务端下发的群组消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenGroupMessage {
    /// 服务端分配的消息 ID（房间内全序）
    pub server_id: Option<u64>,

    /// 发送者标识（公钥）
    pub sender: Option<String>,

    /// 发送时间戳（毫秒）
    pub sent_timestamp: i64,

    /// 不透明消息载荷
    pub payload: Vec<u8>,
}

/// 服务端下发的删除记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeletion {
    /// 删除事件 ID（房间内单调递增）
    pub id: u64,

    /// 被删除消息的 server_id
    pub deleted_message_server_id: u64,
}

/// compact_poll 中单个房间的返回体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactPollBody {
    /// 自上次游标之后的新消息（到达顺序，未排序）
    pub messages: Vec<OpenGroupMessage>,

    /// 自上次删除游标之后的删除记录
    pub deletions: Vec<MessageDeletion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_group_address_format() {
        let group = OpenGroup::new("https://open.example.org", "rust");
        assert_eq!(group.address(), "https://open.example.org.rust");
    }

    #[test]
    fn compact_poll_body_roundtrip() {
        let body = CompactPollBody {
            messages: vec![OpenGroupMessage {
                server_id: Some(7),
                sender: Some("05abc".to_string()),
                sent_timestamp: 1700000000000,
                payload: b"hello".to_vec(),
            }],
            deletions: vec![MessageDeletion {
                id: 3,
                deleted_message_server_id: 2,
            }],
        };
        let json = serde_json::to_string(&body).unwrap();
        let parsed: CompactPollBody = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.messages[0].server_id, Some(7));
        assert_eq!(parsed.deletions[0].deleted_message_server_id, 2);
    }
}
