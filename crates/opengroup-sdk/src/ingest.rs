//! 消息接收管道接口
//!
//! Poller 把每条群组消息包装成规范化 Envelope 后交给接收管道解析与路由。
//! 管道自身负责按 发送者+时间戳+内容 去重，Poller 只保证 at-least-once 投递。

use serde::{Deserialize, Serialize};

/// 群组消息的固定来源设备号
pub const GROUP_MESSAGE_SOURCE_DEVICE: u32 = 1;

/// Envelope 类型标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeType {
    /// 经开放群组中转的消息
    GroupMessage,
}

/// 交给接收管道的规范化消息封装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// 类型标记
    pub envelope_type: EnvelopeType,

    /// 发送者标识
    pub source: String,

    /// 来源设备号
    pub source_device: u32,

    /// 发送时间戳（毫秒）
    pub timestamp: i64,

    /// 不透明消息内容
    pub content: Vec<u8>,

    /// 服务端消息 ID（群组消息必有，便于管道侧落库关联）
    pub server_id: Option<u64>,
}

impl Envelope {
    /// 按开放群组消息的固定格式构造 Envelope
    pub fn group_message(
        source: impl Into<String>,
        timestamp: i64,
        content: Vec<u8>,
        server_id: Option<u64>,
    ) -> Self {
        Self {
            envelope_type: EnvelopeType::GroupMessage,
            source: source.into(),
            source_device: GROUP_MESSAGE_SOURCE_DEVICE,
            timestamp,
            content,
            server_id,
        }
    }
}

/// 单条消息的解析/路由错误
///
/// 一条坏消息不会中断整个批次，错误会被收进当轮的 PollReport。
#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestError {
    #[error("消息解析失败: {0}")]
    Parse(String),

    #[error("消息路由失败: {0}")]
    Routing(String),

    #[error("消息缺少发送者")]
    MissingSender,
}

/// 消息接收管道
///
/// 由上层会话系统实现；对 Poller 而言是可重入、线程安全的外部协作者。
#[async_trait::async_trait]
pub trait MessageIngestionPipeline: Send + Sync {
    /// 解析并路由一条 Envelope
    async fn ingest(&self, envelope: Envelope) -> std::result::Result<(), IngestError>;
}

/// 丢弃所有消息的空管道，测试与压测场景使用
pub struct NoopPipeline;

#[async_trait::async_trait]
impl MessageIngestionPipeline for NoopPipeline {
    async fn ingest(&self, _envelope: Envelope) -> std::result::Result<(), IngestError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_envelope_uses_fixed_source_device() {
        let envelope = Envelope::group_message("05abc", 1700000000000, b"payload".to_vec(), Some(9));
        assert_eq!(envelope.source_device, GROUP_MESSAGE_SOURCE_DEVICE);
        assert_eq!(envelope.envelope_type, EnvelopeType::GroupMessage);
        assert_eq!(envelope.server_id, Some(9));
    }

    #[tokio::test]
    async fn noop_pipeline_accepts_everything() {
        let pipeline = NoopPipeline;
        let envelope = Envelope::group_message("05abc", 0, Vec::new(), None);
        assert!(pipeline.ingest(envelope).await.is_ok());
    }
}
