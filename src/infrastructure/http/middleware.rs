//! HTTP Middleware
//!
//! 每个请求一条摘要日志。handler 通过响应扩展回填 task_id，
//! `ApiError` 回填 errno，中间件据此按路由类别选择日志级别。

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::domain::task::TaskId;

/// 路由类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Upload,
    Poll,
    Ping,
    Other,
}

impl RouteKind {
    pub fn classify(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "/api/task/upload" => RouteKind::Upload,
            "/api/task/status" | "/api/task/result" | "/api/task/error" => RouteKind::Poll,
            "/api/ping" => RouteKind::Ping,
            _ => RouteKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Upload => "upload",
            RouteKind::Poll => "poll",
            RouteKind::Ping => "ping",
            RouteKind::Other => "other",
        }
    }
}

/// 响应涉及的任务
#[derive(Debug, Clone, Copy)]
pub struct LoggedTaskId(pub TaskId);

/// 业务错误码（HTTP 200 + errno != 0）
#[derive(Debug, Clone, Copy)]
pub struct LoggedErrno(pub i32);

/// 请求摘要日志中间件
///
/// - 4xx / 5xx（JSON 解析失败、请求体超限等）：warn / error
/// - 上传：info，带新任务的 task_id
/// - 轮询：debug，轮询频率高
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = RouteKind::classify(&path);
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let errno = response.extensions().get::<LoggedErrno>().map_or(0, |e| e.0);
    let task_id = response
        .extensions()
        .get::<LoggedTaskId>()
        .map(|t| t.0.to_string())
        .unwrap_or_default();

    if response.status().is_server_error() {
        tracing::error!(%method, %path, status, elapsed_ms, "HTTP server error");
    } else if response.status().is_client_error() {
        tracing::warn!(%method, %path, status, elapsed_ms, "HTTP client error");
    } else {
        match route {
            RouteKind::Upload => tracing::info!(
                route = route.as_str(),
                task_id = %task_id,
                errno,
                elapsed_ms,
                "Upload handled"
            ),
            RouteKind::Poll => tracing::debug!(
                route = route.as_str(),
                %path,
                task_id = %task_id,
                errno,
                elapsed_ms,
                "Poll handled"
            ),
            RouteKind::Ping | RouteKind::Other => {
                tracing::trace!(%method, %path, status, elapsed_ms, "Request handled")
            }
        }
    }

    response
}
