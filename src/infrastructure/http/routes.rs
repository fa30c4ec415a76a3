//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping          GET   健康检查
//! - /api/task/upload   POST  上传图片，创建描述任务（multipart，字段 `file`）
//! - /api/task/status   POST  查询任务状态
//! - /api/task/result   POST  获取描述结果（仅 Success）
//! - /api/task/error    POST  获取错误信息（仅 Failure）

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/api", api_routes())
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/task", task_routes())
}

/// Task 路由
fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(handlers::upload_task))
        .route("/status", post(handlers::task_status))
        .route("/result", post(handlers::task_result))
        .route("/error", post(handlers::task_error))
}
