//! Task HTTP Handlers
//!
//! 上传（Task Submitter 入口）与三个轮询接口（Status Reader 入口）

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use std::path::Path;
use std::sync::Arc;

use crate::application::{GetTaskError, GetTaskResult, GetTaskStatus, SubmitCaption};
use crate::infrastructure::http::dto::{
    ApiResponse, SubmitTaskResponse, TaskErrorResponse, TaskIdRequest, TaskResultResponse,
    TaskStatusResponse,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::middleware::LoggedTaskId;
use crate::infrastructure::http::state::AppState;

/// 带 task_id 扩展的成功响应，供请求日志使用
type TaskReply<T> = Result<(Extension<LoggedTaskId>, Json<ApiResponse<T>>), ApiError>;

/// 上传图片，创建描述任务
///
/// 扩展名取自 `file` 字段的文件名，是否允许由提交方校验
pub async fn upload_task(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> TaskReply<SubmitTaskResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let extension = field
            .file_name()
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
            .to_vec();

        upload = Some((extension, data));
    }

    let (extension, image_data) =
        upload.ok_or_else(|| ApiError::BadRequest("Image file is required".to_string()))?;

    let result = state
        .submit_caption_handler
        .handle(SubmitCaption {
            image_data,
            extension,
        })
        .await?;

    Ok((
        Extension(LoggedTaskId(result.task_id)),
        Json(ApiResponse::success(SubmitTaskResponse {
            task_id: result.task_id.to_string(),
        })),
    ))
}

/// 查询任务状态
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdRequest>,
) -> TaskReply<TaskStatusResponse> {
    let view = state
        .get_task_status_handler
        .handle(GetTaskStatus {
            task_id: req.task_id,
        })
        .await?;

    Ok((
        Extension(LoggedTaskId(view.task_id)),
        Json(ApiResponse::success(TaskStatusResponse {
            task_id: view.task_id.to_string(),
            status: view.status.as_str().to_string(),
        })),
    ))
}

/// 获取描述结果
pub async fn task_result(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdRequest>,
) -> TaskReply<TaskResultResponse> {
    let view = state
        .get_task_result_handler
        .handle(GetTaskResult {
            task_id: req.task_id,
        })
        .await?;

    Ok((
        Extension(LoggedTaskId(view.task_id)),
        Json(ApiResponse::success(TaskResultResponse {
            task_id: view.task_id.to_string(),
            result: view.result,
        })),
    ))
}

/// 获取错误信息
pub async fn task_error(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdRequest>,
) -> TaskReply<TaskErrorResponse> {
    let view = state
        .get_task_error_handler
        .handle(GetTaskError {
            task_id: req.task_id,
        })
        .await?;

    Ok((
        Extension(LoggedTaskId(view.task_id)),
        Json(ApiResponse::success(TaskErrorResponse {
            task_id: view.task_id.to_string(),
            error: view.error,
        })),
    ))
}
