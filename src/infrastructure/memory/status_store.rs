//! In-Memory Status Store Implementation
//!
//! 非持久化，用于测试和嵌入式场景。状态转换在 DashMap 条目锁内完成

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{StatusStoreError, StatusStorePort};
use crate::domain::task::{Task, TaskError, TaskId};

/// 内存状态存储
pub struct InMemoryStatusStore {
    /// task_id -> Task
    tasks: DashMap<TaskId, Task>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 在条目锁内修改任务
    fn update<F>(&self, task_id: &TaskId, apply: F) -> Result<(), StatusStoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), TaskError>,
    {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StatusStoreError::NotFound(task_id.to_string()))?;

        let old_status = task.status();
        apply(&mut *task).map_err(|e| match e {
            TaskError::InvalidTransition { from, to } => StatusStoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to,
            },
            other => StatusStoreError::SerializationError(other.to_string()),
        })?;

        tracing::debug!(
            task_id = %task_id,
            old_status = %old_status,
            new_status = %task.status(),
            "Task status changed"
        );
        Ok(())
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStorePort for InMemoryStatusStore {
    async fn create(&self, task: &Task) -> Result<(), StatusStoreError> {
        match self.tasks.entry(*task.id()) {
            Entry::Occupied(_) => Err(StatusStoreError::AlreadyExists(task.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, task_id: &TaskId) -> Result<Option<Task>, StatusStoreError> {
        Ok(self.tasks.get(task_id).map(|t| t.clone()))
    }

    async fn mark_processing(&self, task_id: &TaskId) -> Result<(), StatusStoreError> {
        self.update(task_id, |task| task.start_processing())
    }

    async fn mark_success(&self, task_id: &TaskId, result: &str) -> Result<(), StatusStoreError> {
        self.update(task_id, |task| task.succeed(result))
    }

    async fn mark_failure(&self, task_id: &TaskId, error: &str) -> Result<(), StatusStoreError> {
        self.update(task_id, |task| task.fail(error))
    }
}
