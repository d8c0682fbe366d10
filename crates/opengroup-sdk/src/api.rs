//! 开放群组服务端接口
//!
//! 协议编解码不在 SDK 范围内，这里只定义 compact_poll 的调用契约，
//! 由具体传输层（HTTP / 自定义 RPC）实现。

use std::collections::HashMap;

use crate::error::Result;
use crate::open_group::CompactPollBody;

/// compact_poll 客户端
///
/// 一次调用返回本服务器上所有目标房间自各自游标之后的新消息与删除记录。
/// 网络失败统一映射为 `OpenGroupSDKError::Transport`。
#[async_trait::async_trait]
pub trait CompactPollClient: Send + Sync {
    /// 批量轮询多个房间，返回 room -> 增量数据
    async fn compact_poll(
        &self,
        rooms: &[String],
        server: &str,
    ) -> Result<HashMap<String, CompactPollBody>>;
}
