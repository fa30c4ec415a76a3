//! Domain Layer - 领域层
//!
//! 只有一个限界上下文:
//! - Task Context: 图片描述任务及其状态机

pub mod task;

pub use task::{ImageExtension, Task, TaskError, TaskId, TaskStatus};
