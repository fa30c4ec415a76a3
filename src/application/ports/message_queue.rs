//! Message Queue Port - 任务消息队列
//!
//! 提交方与 worker 之间唯一的耦合点：
//! - 持久化：进程重启后未确认的消息会重新投递
//! - 单消费组：正常情况下每条消息只投递给一个 worker
//! - at-least-once：worker 崩溃可能导致重复投递，由 worker 幂等处理
//! - FIFO 尽力而为，不作为正确性依赖

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::task::{ImageExtension, TaskId};

/// Message Queue 错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),
}

/// 队列消息体
///
/// 只包含定位图片所需的最少信息（task_id + 扩展名），线上格式为 JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: TaskId,
    pub extension: ImageExtension,
}

impl QueueMessage {
    pub fn new(task_id: TaskId, extension: ImageExtension) -> Self {
        Self { task_id, extension }
    }

    pub fn to_body(&self) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(self).map_err(|e| QueueError::SerializationError(e.to_string()))
    }

    pub fn from_body(body: &[u8]) -> Result<Self, QueueError> {
        serde_json::from_slice(body).map_err(|e| QueueError::SerializationError(e.to_string()))
    }
}

/// 一次投递
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 投递标签，用于 ack / nack / dead_letter
    pub tag: u64,
    pub message: QueueMessage,
    /// 第几次投递（首次为 1）
    pub delivery_count: u32,
}

/// 队列统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// Message Queue Port
#[async_trait]
pub trait MessageQueuePort: Send + Sync {
    /// 持久化发布消息（落盘后返回）
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// 取出最早的就绪消息并移入 in-flight
    ///
    /// 最多阻塞 `wait`，超时返回 `Ok(None)`。并发的接收方不会拿到同一条消息。
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// 确认消息，永久删除
    async fn ack(&self, tag: u64) -> Result<(), QueueError>;

    /// 退回消息，等待重新投递
    async fn nack(&self, tag: u64) -> Result<(), QueueError>;

    /// 移入死信
    async fn dead_letter(&self, tag: u64, reason: &str) -> Result<(), QueueError>;

    /// 获取队列统计信息
    async fn stats(&self) -> Result<QueueStats, QueueError>;
}
