//! HTTP Layer - 提交与轮询 API
//!
//! 只做请求转换，生命周期逻辑全部在应用层

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::create_routes;
pub use server::HttpServer;
pub use state::AppState;
