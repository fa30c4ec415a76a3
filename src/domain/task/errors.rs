//! Task Context - Errors

use thiserror::Error;

use super::TaskStatus;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("不支持的图片扩展名: {0}")]
    UnsupportedExtension(String),

    #[error("图片内容为空")]
    EmptyImage,

    #[error("图片过大: {size} bytes, 上限 {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },

    #[error("无效的状态转换: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}
