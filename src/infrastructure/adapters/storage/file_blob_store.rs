//! File Blob Store - 文件系统图片存储实现
//!
//! 实现 BlobStorePort trait。路径为 `{base_dir}/{task_id}.{ext}`，
//! 先写 `.tmp` 文件并 fsync，再 rename 到最终路径

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{BlobStoreError, BlobStorePort};
use crate::domain::task::{ImageExtension, TaskId};

fn io_error(e: std::io::Error) -> BlobStoreError {
    BlobStoreError::IoError(e.to_string())
}

/// 文件系统图片存储
pub struct FileBlobStore {
    /// 存储根目录
    base_dir: PathBuf,
}

impl FileBlobStore {
    /// 创建新的文件存储，目录不存在时自动创建
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, BlobStoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).await.map_err(io_error)?;

        Ok(Self { base_dir })
    }

    /// 获取存储根目录
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn temp_path(&self, task_id: &TaskId, extension: &ImageExtension) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}.tmp", task_id, extension.as_str()))
    }
}

#[async_trait]
impl BlobStorePort for FileBlobStore {
    fn image_path(&self, task_id: &TaskId, extension: &ImageExtension) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", task_id, extension.as_str()))
    }

    async fn save(
        &self,
        task_id: &TaskId,
        extension: &ImageExtension,
        data: &[u8],
    ) -> Result<PathBuf, BlobStoreError> {
        let tmp_path = self.temp_path(task_id, extension);
        let final_path = self.image_path(task_id, extension);

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(io_error(e));
        }

        tracing::debug!(
            task_id = %task_id,
            path = %final_path.display(),
            size = data.len(),
            "Saved image"
        );

        Ok(final_path)
    }

    async fn read(
        &self,
        task_id: &TaskId,
        extension: &ImageExtension,
    ) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.image_path(task_id, extension);

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                BlobStoreError::FileNotFound(path.to_string_lossy().to_string()),
            ),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn exists(&self, task_id: &TaskId, extension: &ImageExtension) -> bool {
        fs::try_exists(self.image_path(task_id, extension))
            .await
            .unwrap_or(false)
    }
}
