//! Worker Layer - Background Task Processing
//!
//! 实现 CaptionWorker，从消息队列消费任务并驱动状态机

mod backoff;
mod caption_worker;

pub use backoff::{next_delay, Backoff, BackoffConfig};
pub use caption_worker::{CaptionWorker, CaptionWorkerConfig, DeliveryOutcome, WorkerError};
