//! Caption Commands - 图片描述任务命令

use crate::domain::task::{TaskId, TaskStatus};

/// 提交图片描述任务命令
#[derive(Debug, Clone)]
pub struct SubmitCaption {
    pub image_data: Vec<u8>,
    /// 原始扩展名（可带前导点，大小写不敏感）
    pub extension: String,
}

/// 提交响应
#[derive(Debug, Clone)]
pub struct SubmitCaptionResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// 提交策略（来自 storage 配置，构造时注入）
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// 允许的扩展名
    pub allowed_extensions: Vec<String>,
    /// 上传文件最大大小（字节）
    pub max_upload_size: u64,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
            max_upload_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}
