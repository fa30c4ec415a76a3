//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（StatusStore、BlobStore、MessageQueue、CaptionEngine）
//! - commands: CQRS 命令及处理器（任务提交）
//! - queries: CQRS 查询及处理器（任务轮询）
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    handlers::SubmitCaptionHandler, SubmissionPolicy, SubmitCaption, SubmitCaptionResponse,
};

pub use error::ApplicationError;

pub use ports::{
    // Blob store
    BlobStoreError,
    BlobStorePort,
    // Caption engine
    CaptionEnginePort,
    CaptionRequest,
    EngineError,
    // Message queue
    Delivery,
    MessageQueuePort,
    QueueError,
    QueueMessage,
    QueueStats,
    // Status store
    StatusStoreError,
    StatusStorePort,
};

pub use queries::{
    handlers::{
        GetTaskErrorHandler, GetTaskResultHandler, GetTaskStatusHandler,
        TaskErrorView, TaskResultView, TaskStatusView,
    },
    GetTaskError, GetTaskResult, GetTaskStatus,
};
