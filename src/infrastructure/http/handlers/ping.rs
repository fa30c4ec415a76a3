//! Ping Handler
//!
//! 健康检查，附带队列积压情况

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::infrastructure::http::state::AppState;

/// Ping 响应
#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// 队列不可用时为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStatsDto>,
}

#[derive(Serialize)]
pub struct QueueStatsDto {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// Ping endpoint - 健康检查
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let queue = match state.queue.stats().await {
        Ok(stats) => Some(QueueStatsDto {
            ready: stats.ready,
            in_flight: stats.in_flight,
            dead_lettered: stats.dead_lettered,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Queue stats unavailable");
            None
        }
    };

    Json(PingResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queue,
    })
}
