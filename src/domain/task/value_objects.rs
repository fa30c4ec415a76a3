//! Task Context - Value Objects

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::TaskError;

/// 任务唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 解析外部传入的 ID，非法格式返回 None（调用方按"不存在"处理）
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务状态
///
/// 只能单向推进: Pending → Processing → {Success | Failure}。
/// Processing → Processing 允许（worker 崩溃后重新投递）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Processing => "Processing",
            TaskStatus::Success => "Success",
            TaskStatus::Failure => "Failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Success)
                | (TaskStatus::Processing, TaskStatus::Failure)
        )
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "Processing" => Ok(TaskStatus::Processing),
            "Success" => Ok(TaskStatus::Success),
            "Failure" => Ok(TaskStatus::Failure),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图片扩展名
///
/// 不变量:
/// - 小写、无前导点（".PNG" → "png"）
/// - 必须在配置的白名单内
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageExtension(String);

impl ImageExtension {
    /// 校验并构造扩展名
    pub fn parse(raw: &str, allowed: &[String]) -> Result<Self, TaskError> {
        let normalized = Self::normalize(raw);
        if normalized.is_empty() || !allowed.iter().any(|a| Self::normalize(a) == normalized) {
            return Err(TaskError::UnsupportedExtension(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    /// 统一格式：去空白、去一个前导点、转小写
    pub fn normalize(raw: &str) -> String {
        let trimmed = raw.trim();
        trimmed
            .strip_prefix('.')
            .unwrap_or(trimmed)
            .to_lowercase()
    }

    /// 从已持久化的数据恢复（跳过白名单校验）
    pub fn restore(raw: impl Into<String>) -> Self {
        Self(Self::normalize(&raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
