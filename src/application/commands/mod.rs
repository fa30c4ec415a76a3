//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：任务提交

mod caption_commands;

pub mod handlers;

pub use caption_commands::*;
