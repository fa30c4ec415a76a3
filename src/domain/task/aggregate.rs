//! Task Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ImageExtension, TaskError, TaskId, TaskStatus};

/// Task 聚合根
///
/// 不变量:
/// - id / extension / image_ref 创建后不可变
/// - 状态只能单向推进，终态（Success / Failure）不可覆盖
/// - result 仅在 Success 时存在，error 仅在 Failure 时存在，二者互斥且只写一次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    extension: ImageExtension,
    image_ref: String,
    status: TaskStatus,
    result: Option<String>,
    error: Option<String>,
    attempts: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建 Pending 任务
    pub fn new(id: TaskId, extension: ImageExtension, image_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            extension,
            image_ref: image_ref.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 从持久化记录恢复
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: TaskId,
        extension: ImageExtension,
        image_ref: String,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
        attempts: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            extension,
            image_ref,
            status,
            result,
            error,
            attempts,
            created_at,
            updated_at,
        }
    }

    /// 进入 Processing（允许重复进入，用于崩溃后重新投递）
    pub fn start_processing(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Processing)?;
        self.attempts += 1;
        Ok(())
    }

    /// 标记成功并记录结果
    pub fn succeed(&mut self, result: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Success)?;
        self.result = Some(result.into());
        Ok(())
    }

    /// 标记失败并记录错误
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failure)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    // Getters
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn extension(&self) -> &ImageExtension {
        &self.extension
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
