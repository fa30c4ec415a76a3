//! Caption Engine Port - 图片描述引擎抽象
//!
//! 引擎对核心是不透明的：输入图片路径，输出文本或错误。
//! 具体实现在 infrastructure/adapters/engine 层

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 引擎错误
///
/// 由 worker 转成文本写入任务的 error 字段，不会继续向上传播
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Caption engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("Caption engine failed: {0}")]
    Failed(String),

    #[error("Invalid engine output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Caption 请求
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// 任务 ID（用于日志和追踪）
    pub task_id: String,
    /// 图片在 Blob Store 中的路径
    pub image_path: PathBuf,
}

/// Caption Engine Port
#[async_trait]
pub trait CaptionEnginePort: Send + Sync {
    /// 为图片生成描述文本
    async fn caption(&self, request: &CaptionRequest) -> Result<String, EngineError>;

    /// 引擎名称（用于日志）
    fn name(&self) -> &'static str;

    /// 检查引擎是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
