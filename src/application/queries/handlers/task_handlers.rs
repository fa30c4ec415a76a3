//! Task Query Handlers
//!
//! 只读，无副作用，每次都直接读取 Status Store（无缓存层）

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::StatusStorePort;
use crate::application::queries::{GetTaskError, GetTaskResult, GetTaskStatus};
use crate::domain::task::{Task, TaskId, TaskStatus};

// ============================================================================
// Response DTOs
// ============================================================================

/// 任务状态响应
#[derive(Debug, Clone)]
pub struct TaskStatusView {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// 任务结果响应
#[derive(Debug, Clone)]
pub struct TaskResultView {
    pub task_id: TaskId,
    pub result: String,
}

/// 任务错误响应
#[derive(Debug, Clone)]
pub struct TaskErrorView {
    pub task_id: TaskId,
    pub error: String,
}

/// 读取任务，非法 ID 与不存在的 ID 一样返回 NotFound
async fn load_task(
    status_store: &Arc<dyn StatusStorePort>,
    raw_id: &str,
) -> Result<Task, ApplicationError> {
    let task_id = TaskId::parse(raw_id).ok_or_else(|| ApplicationError::not_found("Task", raw_id))?;

    status_store
        .find(&task_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Task", raw_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// GetTaskStatus Handler
pub struct GetTaskStatusHandler {
    status_store: Arc<dyn StatusStorePort>,
}

impl GetTaskStatusHandler {
    pub fn new(status_store: Arc<dyn StatusStorePort>) -> Self {
        Self { status_store }
    }

    pub async fn handle(&self, query: GetTaskStatus) -> Result<TaskStatusView, ApplicationError> {
        let task = load_task(&self.status_store, &query.task_id).await?;

        Ok(TaskStatusView {
            task_id: *task.id(),
            status: task.status(),
        })
    }
}

/// GetTaskResult Handler
pub struct GetTaskResultHandler {
    status_store: Arc<dyn StatusStorePort>,
}

impl GetTaskResultHandler {
    pub fn new(status_store: Arc<dyn StatusStorePort>) -> Self {
        Self { status_store }
    }

    pub async fn handle(&self, query: GetTaskResult) -> Result<TaskResultView, ApplicationError> {
        let task = load_task(&self.status_store, &query.task_id).await?;

        match (task.status(), task.result()) {
            (TaskStatus::Success, Some(result)) => Ok(TaskResultView {
                task_id: *task.id(),
                result: result.to_string(),
            }),
            _ => Err(ApplicationError::not_found("Task result", query.task_id)),
        }
    }
}

/// GetTaskError Handler
pub struct GetTaskErrorHandler {
    status_store: Arc<dyn StatusStorePort>,
}

impl GetTaskErrorHandler {
    pub fn new(status_store: Arc<dyn StatusStorePort>) -> Self {
        Self { status_store }
    }

    pub async fn handle(&self, query: GetTaskError) -> Result<TaskErrorView, ApplicationError> {
        let task = load_task(&self.status_store, &query.task_id).await?;

        match (task.status(), task.error()) {
            (TaskStatus::Failure, Some(error)) => Ok(TaskErrorView {
                task_id: *task.id(),
                error: error.to_string(),
            }),
            _ => Err(ApplicationError::not_found("Task error", query.task_id)),
        }
    }
}
