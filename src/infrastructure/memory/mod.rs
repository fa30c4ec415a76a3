//! Memory Layer - In-Memory State
//!
//! 非持久化的 Status Store，用于测试和嵌入式场景

mod status_store;

pub use status_store::InMemoryStatusStore;
