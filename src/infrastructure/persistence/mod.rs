//! Persistence Layer - 数据持久化
//!
//! SQLite（Status Store）和 Sled（Message Queue）存储实现

pub mod sled;
pub mod sqlite;

pub use self::sled::{SledMessageQueue, SledQueueConfig};
pub use self::sqlite::SqliteStatusStore;
