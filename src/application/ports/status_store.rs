//! Status Store Port - 任务状态存储
//!
//! 以 task_id 为键的持久化状态记录，具体实现在 infrastructure/persistence/sqlite
//! 和 infrastructure/memory 层。
//!
//! 状态转换规则由存储层自身保证（条件更新），过期或并发的写入方无法覆盖终态。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::task::{Task, TaskId, TaskStatus};

/// Status Store 错误
#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Status Store Port
#[async_trait]
pub trait StatusStorePort: Send + Sync {
    /// 写入新的 Pending 任务记录
    async fn create(&self, task: &Task) -> Result<(), StatusStoreError>;

    /// 读取任务当前状态（无缓存，直接反映最近一次持久化结果）
    async fn find(&self, task_id: &TaskId) -> Result<Option<Task>, StatusStoreError>;

    /// Pending | Processing → Processing，attempts + 1
    async fn mark_processing(&self, task_id: &TaskId) -> Result<(), StatusStoreError>;

    /// Processing → Success，同时写入 result
    async fn mark_success(&self, task_id: &TaskId, result: &str) -> Result<(), StatusStoreError>;

    /// Processing → Failure，同时写入 error
    async fn mark_failure(&self, task_id: &TaskId, error: &str) -> Result<(), StatusStoreError>;
}
