//! Capflow - 异步图片描述任务系统
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Task Context: 任务 ID、状态机、图片扩展名
//!
//! 应用层 (application/):
//! - Ports: 端口定义（StatusStore, BlobStore, MessageQueue, CaptionEngine）
//! - Commands: 任务提交（SubmitCaptionHandler）
//! - Queries: 任务轮询（状态 / 结果 / 错误）
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: 上传与轮询 API
//! - Worker: CaptionWorker 后台消费
//! - Persistence: SQLite（状态）+ Sled（消息队列）
//! - Adapters: 文件 Blob Store, 描述引擎（进程 / HTTP / Fake）
//! - Memory: 内存 Status Store

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
