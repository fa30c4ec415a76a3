//! Application State
//!
//! HTTP 层持有的端口与 Command/Query Handlers

use std::sync::Arc;

use crate::application::{
    // Command handlers
    SubmitCaptionHandler, SubmissionPolicy,
    // Query handlers
    GetTaskErrorHandler, GetTaskResultHandler, GetTaskStatusHandler,
    // Ports
    BlobStorePort, MessageQueuePort, StatusStorePort,
};

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub status_store: Arc<dyn StatusStorePort>,
    pub queue: Arc<dyn MessageQueuePort>,

    // ========== Command Handlers ==========
    pub submit_caption_handler: SubmitCaptionHandler,

    // ========== Query Handlers ==========
    pub get_task_status_handler: GetTaskStatusHandler,
    pub get_task_result_handler: GetTaskResultHandler,
    pub get_task_error_handler: GetTaskErrorHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        status_store: Arc<dyn StatusStorePort>,
        blob_store: Arc<dyn BlobStorePort>,
        queue: Arc<dyn MessageQueuePort>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            status_store: status_store.clone(),
            queue: queue.clone(),

            submit_caption_handler: SubmitCaptionHandler::new(
                status_store.clone(),
                blob_store,
                queue,
                policy,
            ),

            get_task_status_handler: GetTaskStatusHandler::new(status_store.clone()),
            get_task_result_handler: GetTaskResultHandler::new(status_store.clone()),
            get_task_error_handler: GetTaskErrorHandler::new(status_store),
        }
    }
}
