//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod blob_store;
mod caption_engine;
mod message_queue;
mod status_store;

pub use blob_store::{BlobStoreError, BlobStorePort};
pub use caption_engine::{CaptionEnginePort, CaptionRequest, EngineError};
pub use message_queue::{Delivery, MessageQueuePort, QueueError, QueueMessage, QueueStats};
pub use status_store::{StatusStoreError, StatusStorePort};
