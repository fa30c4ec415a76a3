//! Blob Store Port - 出站端口
//!
//! 定义上传图片的持久化存储抽象，以 task_id 为键

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::task::{ImageExtension, TaskId};

/// 图片存储错误
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Blob Store Port - 出站端口
///
/// 写入必须是原子的：读取方永远不会看到写了一半的文件
#[async_trait]
pub trait BlobStorePort: Send + Sync {
    /// 获取图片路径
    fn image_path(&self, task_id: &TaskId, extension: &ImageExtension) -> PathBuf;

    /// 保存图片数据，返回最终路径
    async fn save(
        &self,
        task_id: &TaskId,
        extension: &ImageExtension,
        data: &[u8],
    ) -> Result<PathBuf, BlobStoreError>;

    /// 读取图片数据
    async fn read(
        &self,
        task_id: &TaskId,
        extension: &ImageExtension,
    ) -> Result<Vec<u8>, BlobStoreError>;

    /// 检查图片是否存在
    async fn exists(&self, task_id: &TaskId, extension: &ImageExtension) -> bool;
}
