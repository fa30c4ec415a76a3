//! Sled Persistence - 持久化消息队列

mod message_queue;

pub use message_queue::*;
