//! Caption Command Handlers
//!
//! SubmitCaptionHandler 即任务提交方，副作用严格按顺序执行:
//! 1. 图片写入 Blob Store
//! 2. Pending 状态写入 Status Store
//! 3. 消息发布到队列
//!
//! 2 必须先于 3：worker 永远不能看到一条没有状态记录的消息。

use std::sync::Arc;

use crate::application::commands::caption_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{BlobStorePort, MessageQueuePort, QueueMessage, StatusStorePort};
use crate::domain::task::{ImageExtension, Task, TaskError, TaskId, TaskStatus};

/// SubmitCaption Handler - 提交图片描述任务
pub struct SubmitCaptionHandler {
    status_store: Arc<dyn StatusStorePort>,
    blob_store: Arc<dyn BlobStorePort>,
    queue: Arc<dyn MessageQueuePort>,
    policy: SubmissionPolicy,
}

impl SubmitCaptionHandler {
    pub fn new(
        status_store: Arc<dyn StatusStorePort>,
        blob_store: Arc<dyn BlobStorePort>,
        queue: Arc<dyn MessageQueuePort>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            status_store,
            blob_store,
            queue,
            policy,
        }
    }

    /// 校验输入，失败时不产生任何副作用
    fn validate(&self, cmd: &SubmitCaption) -> Result<ImageExtension, TaskError> {
        let extension = ImageExtension::parse(&cmd.extension, &self.policy.allowed_extensions)?;

        if cmd.image_data.is_empty() {
            return Err(TaskError::EmptyImage);
        }

        let size = cmd.image_data.len() as u64;
        if self.policy.max_upload_size > 0 && size > self.policy.max_upload_size {
            return Err(TaskError::ImageTooLarge {
                size,
                limit: self.policy.max_upload_size,
            });
        }

        Ok(extension)
    }

    pub async fn handle(&self, cmd: SubmitCaption) -> Result<SubmitCaptionResponse, ApplicationError> {
        let extension = self
            .validate(&cmd)
            .map_err(|e| ApplicationError::validation(e.to_string()))?;

        let task_id = TaskId::new();

        // (a) 图片落盘
        let image_path = self
            .blob_store
            .save(&task_id, &extension, &cmd.image_data)
            .await?;

        // (b) 状态初始化为 Pending
        let task = Task::new(task_id, extension.clone(), image_path.to_string_lossy());
        self.status_store.create(&task).await?;

        // (c) 发布消息
        let message = QueueMessage::new(task_id, extension);
        if let Err(e) = self.queue.publish(&message).await {
            tracing::error!(
                task_id = %task_id,
                error = %e,
                "Queue publish failed, task left Pending without a message"
            );
            return Err(ApplicationError::infrastructure(format!(
                "Failed to enqueue task {}: {}",
                task_id, e
            )));
        }

        tracing::info!(
            task_id = %task_id,
            extension = %message.extension,
            size_bytes = cmd.image_data.len(),
            "Caption task submitted"
        );

        Ok(SubmitCaptionResponse {
            task_id,
            status: TaskStatus::Pending,
        })
    }
}
