//! SQLite Persistence - SQLite 数据库持久化实现

mod database;
mod task_status_repo;

pub use database::*;
pub use task_status_repo::*;
