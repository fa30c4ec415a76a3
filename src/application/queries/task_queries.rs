//! Task Queries - 任务轮询查询
//!
//! task_id 保持原始字符串：非法格式与不存在的任务对轮询方不可区分

/// 查询任务状态
#[derive(Debug, Clone)]
pub struct GetTaskStatus {
    pub task_id: String,
}

/// 查询任务结果（仅 Success 时存在）
#[derive(Debug, Clone)]
pub struct GetTaskResult {
    pub task_id: String,
}

/// 查询任务错误（仅 Failure 时存在）
#[derive(Debug, Clone)]
pub struct GetTaskError {
    pub task_id: String,
}
