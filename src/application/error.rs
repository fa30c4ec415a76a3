//! 应用层错误定义
//!
//! 统一的命令/查询错误类型:
//! - Validation: 输入非法，同步返回，不创建任务
//! - NotFound: 任务不存在，或当前状态下查询无效
//! - Infrastructure: 队列/存储不可用（提交时直接返回给调用方）
//!
//! 引擎错误不在此列：它们作为数据写入任务的 error 字段

use thiserror::Error;

use crate::application::ports::{BlobStoreError, QueueError, StatusStoreError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 基础设施错误（队列/存储不可用）
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::InfrastructureError(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<StatusStoreError> for ApplicationError {
    fn from(err: StatusStoreError) -> Self {
        match err {
            StatusStoreError::NotFound(id) => Self::not_found("Task", id),
            StatusStoreError::InvalidTransition { .. } => Self::InternalError(err.to_string()),
            _ => Self::InfrastructureError(err.to_string()),
        }
    }
}

impl From<BlobStoreError> for ApplicationError {
    fn from(err: BlobStoreError) -> Self {
        Self::InfrastructureError(err.to_string())
    }
}

impl From<QueueError> for ApplicationError {
    fn from(err: QueueError) -> Self {
        Self::InfrastructureError(err.to_string())
    }
}
