//! Task Context - 任务限界上下文
//!
//! 职责:
//! - 任务标识与图片扩展名校验
//! - 任务状态机（Pending → Processing → Success | Failure）
//! - 终态不可覆盖

mod aggregate;
mod errors;
mod value_objects;

pub use aggregate::Task;
pub use errors::TaskError;
pub use value_objects::{ImageExtension, TaskId, TaskStatus};
