//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：任务轮询

mod task_queries;

pub mod handlers;

pub use task_queries::*;
